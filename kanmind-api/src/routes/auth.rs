/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/auth/registration` - Register and receive a token
/// - `POST /api/auth/login` - Exchange credentials for a token
/// - `POST /api/auth/guest-login` - Token for the shared guest account
/// - `POST /api/auth/logout` - Revoke the presented token
/// - `GET /api/auth/me` - Current user profile
/// - `PATCH /api/auth/me` - Update first and last name
/// - `POST /api/auth/password` - Change password, revoking other tokens
/// - `GET /api/email-check?email=` - Look up a user by email

use crate::{
    app::AppState,
    config::GuestConfig,
    error::{validation_details, ApiError, ApiResult, ValidationErrorDetail},
    extract::ApiJson,
    routes::trim_opt,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use kanmind_shared::{
    auth::{middleware::AuthContext, password},
    models::{
        auth_token::AuthToken,
        user::{CreateUser, UpdateUser, User, UserSummary},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Registration request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address, unique case-insensitively
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,

    /// Password, checked against the password policy
    pub password: String,

    /// Must equal `password`
    pub repeated_password: String,

    #[serde(default)]
    #[validate(length(max = 100, message = "First name must be at most 100 characters"))]
    pub first_name: Option<String>,

    #[serde(default)]
    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    pub last_name: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Token and account summary returned by registration and logins
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Opaque token for the `Authorization` header
    pub token: String,

    pub user_id: Uuid,
    pub email: String,
    pub fullname: String,
    pub first_name: String,
    pub last_name: String,
}

impl AuthResponse {
    fn new(user: &User, token: String) -> Self {
        Self {
            token,
            user_id: user.id,
            email: user.email.clone(),
            fullname: user.fullname(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

/// Profile of the authenticated user
#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub fullname: String,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        let fullname = user.fullname();
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            fullname,
            is_guest: user.is_guest,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Profile update request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    #[validate(length(max = 100, message = "First name must be at most 100 characters"))]
    pub first_name: Option<String>,

    #[serde(default)]
    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    pub last_name: Option<String>,
}

/// Password change request
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Email lookup query
#[derive(Debug, Deserialize)]
pub struct EmailCheckQuery {
    pub email: Option<String>,
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".to_string())
}

fn email_taken() -> ApiError {
    ApiError::FieldConflict(ValidationErrorDetail::new(
        "email",
        "A user with this email already exists",
    ))
}

/// Argon2id with 64 MiB of memory runs off the async workers
async fn hash_password(plain: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| ApiError::InternalError(format!("Password task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn verify_password(plain: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| ApiError::InternalError(format!("Password task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Issues a fresh token for `user` and records the login
async fn start_session(state: &AppState, user: &User) -> ApiResult<AuthResponse> {
    let purged = AuthToken::purge_expired(&state.db, user.id).await?;
    if purged > 0 {
        tracing::debug!(user_id = %user.id, purged, "Expired tokens purged");
    }

    let (record, token) = AuthToken::issue(&state.db, user.id, state.token_ttl()).await?;
    User::update_last_login(&state.db, user.id).await?;

    tracing::info!(user_id = %user.id, token_id = %record.id, "User logged in");
    Ok(AuthResponse::new(user, token))
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /api/auth/registration
/// Content-Type: application/json
///
/// {
///   "email": "ada@example.com",
///   "password": "Kanban#Flow9",
///   "repeated_password": "Kanban#Flow9",
///   "first_name": "Ada",
///   "last_name": "Lovelace"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "token": "kmt_...",
///   "user_id": "uuid",
///   "email": "ada@example.com",
///   "fullname": "Ada Lovelace",
///   "first_name": "Ada",
///   "last_name": "Lovelace"
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: every field and password policy violation at once
/// - `409 Conflict`: email already registered
pub async fn register(
    State(state): State<AppState>,
    ApiJson(mut req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.email = req.email.trim().to_string();
    trim_opt(&mut req.first_name);
    trim_opt(&mut req.last_name);

    let mut details = match req.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => validation_details(&errors),
    };
    details.extend(
        password::check_password_policy(&req.password, &req.email)
            .into_iter()
            .map(|problem| ValidationErrorDetail::new("password", problem)),
    );
    if req.password != req.repeated_password {
        details.push(ValidationErrorDetail::new(
            "repeated_password",
            "Passwords do not match",
        ));
    }
    ApiError::check(details)?;

    if User::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(email_taken());
    }

    let password_hash = hash_password(req.password).await?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email,
            password_hash,
            first_name: req.first_name.unwrap_or_default(),
            last_name: req.last_name.unwrap_or_default(),
            is_guest: false,
        },
    )
    .await?;

    let (_, token) = AuthToken::issue(&state.db, user.id, state.token_ttl()).await?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(AuthResponse::new(&user, token))))
}

/// Login with email and password
///
/// # Errors
///
/// - `400 Bad Request`: empty email or password
/// - `401 Unauthorized`: unknown email or wrong password
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| {
            tracing::debug!("Login with unknown email");
            invalid_credentials()
        })?;

    if !verify_password(req.password, user.password_hash.clone()).await? {
        tracing::debug!(user_id = %user.id, "Login with wrong password");
        return Err(invalid_credentials());
    }

    Ok(Json(start_session(&state, &user).await?))
}

/// Login as the shared guest account
///
/// The account is created on first use.
///
/// # Errors
///
/// - `404 Not Found`: guest login is disabled
/// - `403 Forbidden`: the guest email belongs to a regular account
pub async fn guest_login(State(state): State<AppState>) -> ApiResult<Json<AuthResponse>> {
    let guest = state
        .config
        .auth
        .guest
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Guest login is not enabled".to_string()))?;

    let user = match User::find_by_email(&state.db, &guest.email).await? {
        Some(user) => user,
        None => create_guest(&state, guest).await?,
    };

    if !user.is_guest {
        tracing::warn!(user_id = %user.id, "Guest email belongs to a regular account");
        return Err(ApiError::Forbidden("Guest login is unavailable".to_string()));
    }

    Ok(Json(start_session(&state, &user).await?))
}

async fn create_guest(state: &AppState, guest: &GuestConfig) -> ApiResult<User> {
    let password_hash = hash_password(guest.password.clone()).await?;

    let created = User::create(
        &state.db,
        CreateUser {
            email: guest.email.clone(),
            password_hash,
            first_name: "Guest".to_string(),
            last_name: String::new(),
            is_guest: true,
        },
    )
    .await;

    match created {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "Guest account created");
            Ok(user)
        }
        // A concurrent guest login created it first
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            User::find_by_email(&state.db, &guest.email)
                .await?
                .ok_or_else(|| ApiError::InternalError("Guest account vanished".to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Revoke the token that authenticated this request
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<StatusCode> {
    AuthToken::revoke(&state.db, auth.token_id).await?;

    tracing::info!(user_id = %auth.user_id, token_id = %auth.token_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// Profile of the authenticated user
pub async fn current_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UserProfile>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

/// Update first and last name
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(mut req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    trim_opt(&mut req.first_name);
    trim_opt(&mut req.last_name);
    req.validate()?;

    let user = User::update(
        &state.db,
        auth.user_id,
        UpdateUser {
            first_name: req.first_name,
            last_name: req.last_name,
            ..Default::default()
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(Json(user.into()))
}

/// Change the password
///
/// Every token except the one used for this request is revoked.
///
/// # Errors
///
/// - `400 Bad Request`: wrong current password or policy violations
/// - `403 Forbidden`: guest accounts cannot change their password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if user.is_guest {
        return Err(ApiError::Forbidden(
            "Guest accounts cannot change their password".to_string(),
        ));
    }

    if !verify_password(req.current_password.clone(), user.password_hash.clone()).await? {
        return Err(ApiError::field(
            "current_password",
            "Current password is incorrect",
        ));
    }

    let mut details: Vec<ValidationErrorDetail> =
        password::check_password_policy(&req.new_password, &user.email)
            .into_iter()
            .map(|problem| ValidationErrorDetail::new("new_password", problem))
            .collect();
    if req.new_password == req.current_password {
        details.push(ValidationErrorDetail::new(
            "new_password",
            "New password must differ from the current password",
        ));
    }
    ApiError::check(details)?;

    let password_hash = hash_password(req.new_password).await?;
    User::update(
        &state.db,
        user.id,
        UpdateUser {
            password_hash: Some(password_hash),
            ..Default::default()
        },
    )
    .await?;

    let revoked = AuthToken::revoke_others(&state.db, user.id, auth.token_id).await?;

    tracing::info!(user_id = %user.id, revoked, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

/// Look up a user by email
///
/// Used by the frontend to resolve members before adding them to a board.
///
/// # Errors
///
/// - `400 Bad Request`: `email` missing or blank
/// - `404 Not Found`: no user with that email
pub async fn email_check(
    State(state): State<AppState>,
    Query(query): Query<EmailCheckQuery>,
) -> ApiResult<Json<UserSummary>> {
    let email = query
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| ApiError::BadRequest("The email query parameter is required".to_string()))?;

    let user = User::find_by_email(&state.db, email)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user with this email".to_string()))?;

    Ok(Json(user.summary()))
}
