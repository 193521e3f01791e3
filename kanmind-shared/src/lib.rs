//! # KanMind Shared Library
//!
//! Data layer and security primitives used by the KanMind API server.
//!
//! ## Module Organization
//!
//! - `db`: connection pool and schema migrations
//! - `models`: users, boards, columns, tasks and comments with their SQL operations
//! - `auth`: password hashing, opaque login tokens, request authentication
//!   and board-level authorization rules

pub mod auth;
pub mod db;
pub mod models;

/// Current version of the KanMind shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
