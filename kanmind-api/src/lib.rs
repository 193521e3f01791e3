//! # KanMind API Server Library
//!
//! REST API for Kanban boards: identity, boards with members and columns,
//! tasks with assignees, reviewers and comments.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request extractors with JSON error bodies
//! - `middleware`: Token authentication and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
