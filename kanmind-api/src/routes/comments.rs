/// Comment endpoints
///
/// # Endpoints
///
/// - `GET /api/tasks/:id/comments` - Comments, oldest first
/// - `POST /api/tasks/:id/comments` - Add a comment
/// - `DELETE /api/tasks/:id/comments/:comment_id` - Delete (author or board owner)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath},
    routes::tasks::authorized_task,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use kanmind_shared::{
    auth::{
        authorization::{can_delete_comment, require, BoardPermission},
        middleware::AuthContext,
    },
    models::comment::{Comment, CommentDetails},
};
use serde::Deserialize;
use uuid::Uuid;

/// Longest accepted comment, in characters
pub const MAX_COMMENT_LENGTH: usize = 5000;

/// Add comment request
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

/// Trimmed comment text, or a validation error on `content`
fn comment_content(raw: &str) -> ApiResult<&str> {
    let content = raw.trim();
    let length = content.chars().count();

    if length == 0 {
        return Err(ApiError::field("content", "Comment may not be blank"));
    }
    if length > MAX_COMMENT_LENGTH {
        return Err(ApiError::field(
            "content",
            format!("Comment must be at most {} characters", MAX_COMMENT_LENGTH),
        ));
    }

    Ok(content)
}

/// List the comments of a task
pub async fn list_comments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(task_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<CommentDetails>>> {
    let (task, _) = authorized_task(&state.db, task_id, auth.user_id, BoardPermission::Read).await?;

    let comments = Comment::list_by_task(&state.db, task.id).await?;
    Ok(Json(Comment::with_authors(&state.db, comments).await?))
}

/// Add a comment to a task
///
/// # Errors
///
/// - `400 Bad Request`: blank or longer than 5000 characters
/// - `403 Forbidden`: not a participant of the task's board
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(task_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentDetails>)> {
    let (task, _) = authorized_task(&state.db, task_id, auth.user_id, BoardPermission::Write).await?;

    let content = comment_content(&req.content)?;
    let comment = Comment::create(&state.db, task.id, auth.user_id, content).await?;

    let details = Comment::with_authors(&state.db, vec![comment])
        .await?
        .pop()
        .ok_or_else(|| ApiError::InternalError("Comment author missing".to_string()))?;

    Ok((StatusCode::CREATED, Json(details)))
}

/// Delete a comment (author or board owner)
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((task_id, comment_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let (task, access) =
        authorized_task(&state.db, task_id, auth.user_id, BoardPermission::Read).await?;

    let comment = Comment::find(&state.db, task.id, comment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    require(
        can_delete_comment(&access, auth.user_id, comment.author_id),
        "delete this comment",
    )?;

    if !Comment::delete(&state.db, comment.id).await? {
        return Err(ApiError::NotFound("Comment not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_content_trimmed() {
        assert_eq!(comment_content("  Looks good \n").unwrap(), "Looks good");
    }

    #[test]
    fn test_comment_content_blank() {
        assert!(matches!(
            comment_content(" \t\n"),
            Err(ApiError::ValidationError(details)) if details[0].field == "content"
        ));
    }

    #[test]
    fn test_comment_content_length_counts_characters() {
        assert!(comment_content(&"ä".repeat(MAX_COMMENT_LENGTH)).is_ok());
        assert!(comment_content(&"a".repeat(MAX_COMMENT_LENGTH + 1)).is_err());
    }
}
