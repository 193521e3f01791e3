/// Middleware for the API server
///
/// - `auth`: token authentication for protected routes
/// - `security`: security response headers

pub mod auth;
pub mod security;
