/// Token authentication layer
///
/// Resolves the `Authorization` header through
/// [`kanmind_shared::auth::middleware::authenticate`] and inserts the
/// resulting [`AuthContext`] into request extensions. Requests without a
/// valid token never reach the handler.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use kanmind_shared::auth::middleware::{authenticate, AuthContext};

use crate::{app::AppState, error::ApiError};

/// Authentication middleware for protected routes
///
/// Attach with `axum::middleware::from_fn_with_state(state, auth_layer)`.
pub async fn auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth: AuthContext = authenticate(&state.db, req.headers()).await.map_err(|err| {
        tracing::debug!(error = %err, path = %req.uri().path(), "Request rejected by token check");
        ApiError::from(err)
    })?;

    tracing::Span::current().record("user_id", tracing::field::display(auth.user_id));
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
