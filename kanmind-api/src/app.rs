/// Application state and router builder
///
/// This module defines the shared application state and builds the Axum
/// router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use kanmind_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = kanmind_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::auth::auth_layer, middleware::security::SecurityHeadersLayer};
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned into every handler through Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    /// Lifetime of newly issued login tokens
    pub fn token_ttl(&self) -> Option<chrono::Duration> {
        self.config.auth.token_ttl()
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health                                  (public)
/// └── /api/
///     ├── /auth/registration, /auth/login, /auth/guest-login   (public)
///     ├── /auth/logout, /auth/me, /auth/password
///     ├── /email-check
///     ├── /boards, /boards/:id
///     │   ├── /members, /members/:user_id
///     │   ├── /columns, /columns/order
///     │   └── /tasks
///     ├── /columns/:id
///     └── /tasks, /tasks/assigned-to-me, /tasks/reviewing, /tasks/:id
///         └── /comments, /comments/:comment_id
/// ```
///
/// Everything under `/api` except the three public auth routes requires a
/// token.
///
/// # Middleware Stack
///
/// Outermost first: security headers, CORS, request tracing, then token
/// authentication on protected routes.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Credential exchange (public)
    let public_routes = Router::new()
        .route("/auth/registration", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/guest-login", post(routes::auth::guest_login));

    // Everything else requires a token
    let protected_routes = Router::new()
        .route("/auth/logout", post(routes::auth::logout))
        .route(
            "/auth/me",
            get(routes::auth::current_user).patch(routes::auth::update_profile),
        )
        .route("/auth/password", post(routes::auth::change_password))
        .route("/email-check", get(routes::auth::email_check))
        .route(
            "/boards",
            get(routes::boards::list_boards).post(routes::boards::create_board),
        )
        .route(
            "/boards/:id",
            get(routes::boards::get_board)
                .patch(routes::boards::update_board)
                .delete(routes::boards::delete_board),
        )
        .route("/boards/:id/members", post(routes::boards::add_member))
        .route(
            "/boards/:id/members/:user_id",
            delete(routes::boards::remove_member),
        )
        .route(
            "/boards/:id/columns",
            get(routes::columns::list_columns).post(routes::columns::create_column),
        )
        .route(
            "/boards/:id/columns/order",
            put(routes::columns::reorder_columns),
        )
        .route("/boards/:id/tasks", get(routes::tasks::list_board_tasks))
        .route(
            "/columns/:id",
            get(routes::columns::get_column)
                .patch(routes::columns::rename_column)
                .delete(routes::columns::delete_column),
        )
        .route("/tasks", post(routes::tasks::create_task))
        .route("/tasks/assigned-to-me", get(routes::tasks::assigned_to_me))
        .route("/tasks/reviewing", get(routes::tasks::reviewing))
        .route(
            "/tasks/:id",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route(
            "/tasks/:id/comments",
            get(routes::comments::list_comments).post(routes::comments::create_comment),
        )
        .route(
            "/tasks/:id/comments/:comment_id",
            delete(routes::comments::delete_comment),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_layer,
        ));

    let api_routes = Router::new().merge(public_routes).merge(protected_routes);

    // Combine all routes with middleware stack
    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        user_id = tracing::field::Empty,
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// CORS restricted to the configured frontend origins
///
/// A `*` entry switches to permissive CORS for local development.
pub fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_permissive() {
        tracing::warn!("CORS is permissive; set CORS_ORIGINS to restrict it");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
