/// Task endpoints
///
/// # Endpoints
///
/// - `GET /api/boards/:id/tasks` - Tasks of a board
/// - `POST /api/tasks` - Create a task at the end of a column
/// - `GET /api/tasks/assigned-to-me` - Tasks assigned to the user
/// - `GET /api/tasks/reviewing` - Tasks the user reviews
/// - `GET /api/tasks/:id` - One task
/// - `PATCH /api/tasks/:id` - Update fields, people, column or position
/// - `DELETE /api/tasks/:id` - Delete (board owner or task creator)
///
/// The assignee and every reviewer must be a participant of the task's
/// board.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{double_option, ApiJson, ApiPath},
    routes::{trim_in_place, trim_opt},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::NaiveDate;
use kanmind_shared::{
    auth::{
        authorization::{can_delete_task, require, require_board_permission, BoardPermission},
        middleware::AuthContext,
    },
    models::{
        board::BoardAccess,
        column::Column,
        task::{CreateTask, Task, TaskDetails, TaskPriority, UpdateTask},
    },
};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Create task request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    pub column_id: Uuid,

    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    /// Defaults to `medium`
    #[serde(default)]
    pub priority: Option<TaskPriority>,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub assignee_id: Option<Uuid>,

    #[serde(default)]
    pub reviewer_ids: Vec<Uuid>,
}

/// Update task request
///
/// Absent fields are left alone. `due_date` and `assignee_id` accept
/// `null` to clear them.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: Option<String>,

    #[serde(default)]
    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Option<TaskPriority>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,

    /// Replaces the reviewer set when present
    #[serde(default)]
    pub reviewer_ids: Option<Vec<Uuid>>,

    /// Target column, same board only
    #[serde(default)]
    pub column_id: Option<Uuid>,

    #[serde(default)]
    #[validate(range(min = 0, message = "Position must not be negative"))]
    pub position: Option<i32>,
}

async fn details(pool: &PgPool, tasks: Vec<Task>) -> ApiResult<Vec<TaskDetails>> {
    Ok(Task::with_details(pool, tasks).await?)
}

async fn single_details(pool: &PgPool, task: Task) -> ApiResult<TaskDetails> {
    details(pool, vec![task])
        .await?
        .pop()
        .ok_or_else(|| ApiError::InternalError("Task details missing".to_string()))
}

/// Loads a task and checks `permission` on its board
pub(crate) async fn authorized_task(
    pool: &PgPool,
    task_id: Uuid,
    user_id: Uuid,
    permission: BoardPermission,
) -> ApiResult<(Task, BoardAccess)> {
    let task = Task::find_by_id(pool, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    let access = require_board_permission(pool, task.board_id, user_id, permission).await?;
    Ok((task, access))
}

/// List the tasks of a board
pub async fn list_board_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(board_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<TaskDetails>>> {
    require_board_permission(&state.db, board_id, auth.user_id, BoardPermission::Read).await?;

    let tasks = Task::list_by_board(&state.db, board_id).await?;
    Ok(Json(details(&state.db, tasks).await?))
}

/// Create a task
///
/// # Endpoint
///
/// ```text
/// POST /api/tasks
/// Content-Type: application/json
///
/// {
///   "column_id": "uuid",
///   "title": "Write release notes",
///   "priority": "high",
///   "due_date": "2025-03-01",
///   "assignee_id": "uuid",
///   "reviewer_ids": ["uuid"]
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: unknown column, invalid fields, assignee or
///   reviewers outside the board
/// - `403 Forbidden`: not a participant of the column's board
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(mut req): ApiJson<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskDetails>)> {
    let column = Column::find_by_id(&state.db, req.column_id)
        .await?
        .ok_or_else(|| ApiError::field("column_id", "Column does not exist"))?;

    require_board_permission(&state.db, column.board_id, auth.user_id, BoardPermission::Write)
        .await?;

    trim_in_place(&mut req.title);
    trim_opt(&mut req.description);
    req.validate()?;

    let task = Task::create(
        &state.db,
        CreateTask {
            board_id: column.board_id,
            column_id: column.id,
            title: req.title,
            description: req.description.unwrap_or_default(),
            priority: req.priority.unwrap_or_default(),
            due_date: req.due_date,
            assignee_id: req.assignee_id,
            reviewer_ids: req.reviewer_ids,
            created_by: auth.user_id,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(single_details(&state.db, task).await?)))
}

/// Tasks assigned to the current user, across boards
pub async fn assigned_to_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<TaskDetails>>> {
    let tasks = Task::list_assigned_to(&state.db, auth.user_id).await?;
    Ok(Json(details(&state.db, tasks).await?))
}

/// Tasks the current user reviews, across boards
pub async fn reviewing(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<TaskDetails>>> {
    let tasks = Task::list_reviewing(&state.db, auth.user_id).await?;
    Ok(Json(details(&state.db, tasks).await?))
}

/// Get one task
pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(task_id): ApiPath<Uuid>,
) -> ApiResult<Json<TaskDetails>> {
    let (task, _) = authorized_task(&state.db, task_id, auth.user_id, BoardPermission::Read).await?;
    Ok(Json(single_details(&state.db, task).await?))
}

/// Update a task
///
/// Moving to another column without `position` appends the task there.
///
/// # Errors
///
/// - `400 Bad Request`: invalid fields, a column of another board,
///   assignee or reviewers outside the board
/// - `403 Forbidden`: not a participant of the task's board
pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(task_id): ApiPath<Uuid>,
    ApiJson(mut req): ApiJson<UpdateTaskRequest>,
) -> ApiResult<Json<TaskDetails>> {
    let (task, _) = authorized_task(&state.db, task_id, auth.user_id, BoardPermission::Write).await?;

    trim_opt(&mut req.title);
    trim_opt(&mut req.description);
    req.validate()?;

    if let Some(column_id) = req.column_id.filter(|id| *id != task.column_id) {
        let same_board = Column::find_by_id(&state.db, column_id)
            .await?
            .is_some_and(|column| column.board_id == task.board_id);

        if !same_board {
            return Err(ApiError::field(
                "column_id",
                "Column does not belong to this task's board",
            ));
        }
    }

    let task = Task::update(
        &state.db,
        task.id,
        UpdateTask {
            title: req.title,
            description: req.description,
            priority: req.priority,
            due_date: req.due_date,
            assignee_id: req.assignee_id,
            reviewer_ids: req.reviewer_ids,
            column_id: req.column_id,
            position: req.position,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(Json(single_details(&state.db, task).await?))
}

/// Delete a task (board owner or task creator)
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(task_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let (task, access) =
        authorized_task(&state.db, task_id, auth.user_id, BoardPermission::Read).await?;

    require(
        can_delete_task(&access, auth.user_id, task.created_by),
        "delete this task",
    )?;

    if !Task::delete(&state.db, task.id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults() {
        let column_id = Uuid::new_v4();
        let req: CreateTaskRequest = serde_json::from_value(serde_json::json!({
            "column_id": column_id,
            "title": "Write release notes"
        }))
        .unwrap();

        assert_eq!(req.column_id, column_id);
        assert!(req.priority.is_none());
        assert!(req.reviewer_ids.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_create_request_rejects_unknown_priority() {
        let result: Result<CreateTaskRequest, _> = serde_json::from_value(serde_json::json!({
            "column_id": Uuid::new_v4(),
            "title": "x",
            "priority": "urgent"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_update_request_null_clears() {
        let req: UpdateTaskRequest = serde_json::from_value(serde_json::json!({
            "assignee_id": null,
            "due_date": "2025-03-01"
        }))
        .unwrap();

        assert_eq!(req.assignee_id, Some(None));
        assert_eq!(req.due_date, Some(NaiveDate::from_ymd_opt(2025, 3, 1)));
        assert!(req.title.is_none());
        assert!(req.reviewer_ids.is_none());
    }

    #[test]
    fn test_update_request_negative_position() {
        let req: UpdateTaskRequest =
            serde_json::from_value(serde_json::json!({ "position": -1 })).unwrap();
        assert!(req.validate().is_err());
    }
}
