/// Request authentication
///
/// Resolves the `Authorization` header to an [`AuthContext`]. Two schemes
/// are accepted for the same opaque token:
///
/// ```text
/// Authorization: Token kmt_...
/// Authorization: Bearer kmt_...
/// ```
///
/// # Example
///
/// ```no_run
/// use axum::{extract::Request, middleware::Next, response::Response};
/// use kanmind_shared::auth::middleware::{authenticate, AuthError};
/// use sqlx::PgPool;
///
/// async fn layer(pool: PgPool, mut req: Request, next: Next) -> Result<Response, AuthError> {
///     let auth = authenticate(&pool, req.headers()).await?;
///     req.extensions_mut().insert(auth);
///     Ok(next.run(req).await)
/// }
/// ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::token::validate_token_format;
use crate::models::auth_token::AuthToken;

/// Authentication context added to request extensions
///
/// Handlers take it with `Extension<AuthContext>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user
    pub user_id: Uuid,

    /// Token that authenticated the request
    pub token_id: Uuid,
}

impl From<&AuthToken> for AuthContext {
    fn from(token: &AuthToken) -> Self {
        Self {
            user_id: token.user_id,
            token_id: token.id,
        }
    }
}

/// Error type for request authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header
    #[error("Authentication credentials were not provided")]
    MissingCredentials,

    /// Header present but not `Token <key>` / `Bearer <key>`
    #[error("Invalid authorization header: {0}")]
    InvalidFormat(&'static str),

    /// Unknown, revoked or expired token
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Token lookup failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Pulls the token out of an `Authorization` header value
pub fn extract_token(header_value: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header_value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::InvalidFormat("expected '<scheme> <token>'"))?;

    if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidFormat("scheme must be Token or Bearer"));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidFormat("token is empty"));
    }

    Ok(token)
}

/// Authenticates a request from its headers
///
/// Malformed tokens are rejected before touching the database.
///
/// # Errors
///
/// - `MissingCredentials` when there is no header
/// - `InvalidFormat` when the header cannot be parsed
/// - `InvalidToken` when the token is unknown, revoked or expired
pub async fn authenticate(pool: &PgPool, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("header is not valid ASCII"))?;

    let token = extract_token(value)?;

    if !validate_token_format(token) {
        return Err(AuthError::InvalidToken);
    }

    let record = AuthToken::authenticate(pool, token)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    Ok(AuthContext::from(&record))
}
