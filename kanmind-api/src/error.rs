/// Error handling for the API server
///
/// All handlers return `ApiResult<T>`. Shared-layer errors convert into
/// [`ApiError`] with `?`, and every variant renders the same JSON body:
///
/// ```json
/// {
///   "error": "validation_error",
///   "message": "Request validation failed",
///   "details": [{ "field": "title", "message": "Title may not be blank" }]
/// }
/// ```
///
/// # Example
///
/// ```
/// use kanmind_api::error::{ApiError, ApiResult};
///
/// fn find(found: bool) -> ApiResult<&'static str> {
///     if !found {
///         return Err(ApiError::NotFound("Board not found".to_string()));
///     }
///     Ok("board")
/// }
///
/// assert!(find(false).is_err());
/// ```

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kanmind_shared::auth::{
    authorization::AuthzError, middleware::AuthError, password::PasswordError,
};
use kanmind_shared::models::task::TaskWriteError;
use serde::{Deserialize, Serialize};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Field-level validation failure (400)
    #[error("Validation failed: {} errors", .0.len())]
    ValidationError(Vec<ValidationErrorDetail>),

    /// Missing or invalid token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Conflict on a single field, e.g. a registered email (409)
    #[error("Conflict on {}: {}", .0.field, .0.message)]
    FieldConflict(ValidationErrorDetail),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Field errors, for validation failures and field conflicts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// Single-field validation error
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }

    /// Fails with `ValidationError` when `details` is not empty
    pub fn check(details: Vec<ValidationErrorDetail>) -> ApiResult<()> {
        if details.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ValidationError(details))
        }
    }

    /// HTTP status of this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::FieldConflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_code, message, details) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::ValidationError(errors) => (
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::FieldConflict(detail) => {
                ("conflict", detail.message.clone(), Some(vec![detail]))
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Token"));
        }
        response
    }
}

/// Convert validator errors to field details, sorted by field
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(validation_details(&errors))
    }
}

/// Flattens `validator` field errors into [`ValidationErrorDetail`]s
pub fn validation_details(errors: &validator::ValidationErrors) -> Vec<ValidationErrorDetail> {
    let mut details: Vec<ValidationErrorDetail> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                ValidationErrorDetail::new(
                    field.to_string(),
                    error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Invalid value".to_string()),
                )
            })
        })
        .collect();

    details.sort_by(|a, b| a.field.cmp(&b.field));
    details
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    if db_err.constraint() == Some("users_email_key") {
                        return ApiError::FieldConflict(ValidationErrorDetail::new(
                            "email",
                            "A user with this email already exists",
                        ));
                    }
                    return ApiError::Conflict(format!(
                        "Constraint violation: {}",
                        db_err.constraint().unwrap_or("unique")
                    ));
                }

                if db_err.is_foreign_key_violation() {
                    return ApiError::BadRequest(
                        "Request references a resource that does not exist".to_string(),
                    );
                }

                if db_err.is_check_violation() {
                    return ApiError::BadRequest(format!(
                        "Constraint violation: {}",
                        db_err.constraint().unwrap_or("check")
                    ));
                }

                // Other database errors are internal
                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert authentication errors to API errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Database(db_err) => {
                ApiError::InternalError(format!("Token lookup failed: {}", db_err))
            }
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::BoardNotFound(_) => ApiError::NotFound("Board not found".to_string()),
            AuthzError::NotParticipant(_) => {
                ApiError::Forbidden("You are not a member of this board".to_string())
            }
            AuthzError::InsufficientRole { .. } => {
                ApiError::Forbidden("Only the board owner can do this".to_string())
            }
            AuthzError::NotAuthorized(action) => {
                ApiError::Forbidden(format!("You are not allowed to {}", action))
            }
            AuthzError::DatabaseError(db_err) => ApiError::from(db_err),
        }
    }
}

/// Convert task write errors to API errors
///
/// Non-participants are reported per field so one response names every
/// offending id.
impl From<TaskWriteError> for ApiError {
    fn from(err: TaskWriteError) -> Self {
        match err {
            TaskWriteError::NotParticipants {
                assignee_id,
                reviewer_ids,
                ..
            } => {
                let mut details = Vec::new();
                if let Some(assignee_id) = assignee_id {
                    details.push(ValidationErrorDetail::new(
                        "assignee_id",
                        format!("User {} is not a member of this board", assignee_id),
                    ));
                }
                if !reviewer_ids.is_empty() {
                    details.push(ValidationErrorDetail::new(
                        "reviewer_ids",
                        format!(
                            "Users {} are not members of this board",
                            crate::routes::join_ids(&reviewer_ids)
                        ),
                    ));
                }
                ApiError::ValidationError(details)
            }
            TaskWriteError::Database(db_err) => ApiError::from(db_err),
        }
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

/// Malformed or mistyped JSON bodies
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Path segments that fail to parse, e.g. a malformed UUID
impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanmind_shared::models::board::BoardRole;
    use uuid::Uuid;
    use validator::Validate;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("Board not found".to_string());
        assert_eq!(err.to_string(), "Not found: Board not found");

        let err = ApiError::ValidationError(vec![
            ValidationErrorDetail::new("title", "Title may not be blank"),
            ValidationErrorDetail::new("members", "Unknown user"),
        ]);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::field("title", "x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized(String::new()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden(String::new()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound(String::new()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::FieldConflict(ValidationErrorDetail::new("email", "taken")).status(),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_validation_response_body() {
        let response = ApiError::field("repeated_password", "Passwords do not match").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["details"][0]["field"], "repeated_password");
        assert_eq!(body["details"][0]["message"], "Passwords do not match");
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let response = ApiError::InternalError("connection reset".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["message"], "An internal error occurred");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_unauthorized_sets_challenge() {
        let response = ApiError::Unauthorized("no token".to_string()).into_response();
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Token");
    }

    #[test]
    fn test_authz_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(ApiError::from(AuthzError::BoardNotFound(id)).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(AuthzError::NotParticipant(id)).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(AuthzError::InsufficientRole {
                required: BoardRole::Owner,
                actual: BoardRole::Member,
            })
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthzError::NotAuthorized("delete this comment")).to_string(),
            "Forbidden: You are not allowed to delete this comment"
        );
    }

    #[test]
    fn test_task_write_mapping() {
        let outsider = Uuid::new_v4();
        let err = ApiError::from(TaskWriteError::NotParticipants {
            board_id: Uuid::new_v4(),
            assignee_id: Some(outsider),
            reviewer_ids: vec![outsider],
        });

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        match err {
            ApiError::ValidationError(details) => {
                let fields: Vec<&str> = details.iter().map(|d| d.field.as_str()).collect();
                assert_eq!(fields, vec!["assignee_id", "reviewer_ids"]);
                assert!(details[1].message.contains(&outsider.to_string()));
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        assert_eq!(
            ApiError::from(TaskWriteError::Database(sqlx::Error::RowNotFound)).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_auth_mapping() {
        assert_eq!(ApiError::from(AuthError::MissingCredentials).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(AuthError::InvalidToken).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(AuthError::InvalidFormat("token is empty")).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        assert_eq!(ApiError::from(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "Title is required"))]
        title: String,
        #[validate(email(message = "Invalid email format"))]
        email: String,
    }

    #[test]
    fn test_validator_errors_sorted_by_field() {
        let sample = Sample {
            title: String::new(),
            email: "not-an-email".to_string(),
        };

        let details = validation_details(&sample.validate().unwrap_err());
        assert_eq!(
            details,
            vec![
                ValidationErrorDetail::new("email", "Invalid email format"),
                ValidationErrorDetail::new("title", "Title is required"),
            ]
        );
    }

    #[test]
    fn test_check() {
        assert!(ApiError::check(Vec::new()).is_ok());
        assert!(matches!(
            ApiError::check(vec![ValidationErrorDetail::new("title", "x")]),
            Err(ApiError::ValidationError(_))
        ));
    }
}
