/// Board endpoints
///
/// # Endpoints
///
/// - `GET /api/boards` - Boards the user owns or belongs to, with counters
/// - `POST /api/boards` - Create a board, the requester becomes owner
/// - `GET /api/boards/:id` - Board with members, columns and tasks
/// - `PATCH /api/boards/:id` - Update title, description or member set (owner)
/// - `DELETE /api/boards/:id` - Delete a board and everything in it (owner)
/// - `POST /api/boards/:id/members` - Add a member (owner)
/// - `DELETE /api/boards/:id/members/:user_id` - Remove a member (owner, or self)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath},
    routes::{columns::ColumnView, join_ids, trim_in_place, trim_opt},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use kanmind_shared::{
    auth::{
        authorization::{can_remove_member, require, require_board_permission, BoardPermission},
        middleware::AuthContext,
    },
    models::{
        board::{Board, BoardSummary, CreateBoard, UpdateBoard},
        board_member::BoardMember,
        column::Column,
        task::{dedup_ids, Task, TaskDetails},
        user::{User, UserSummary},
    },
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

/// Create board request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBoardRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be 1 to 100 characters"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    /// Initial members, owner excluded
    #[serde(default)]
    pub members: Vec<Uuid>,
}

/// Update board request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBoardRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Title must be 1 to 100 characters"))]
    pub title: Option<String>,

    #[serde(default)]
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    /// Replaces the member set when present
    #[serde(default)]
    pub members: Option<Vec<Uuid>>,
}

/// Add member request
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

/// A column with its tasks, as nested in [`BoardDetail`]
#[derive(Debug, Serialize)]
pub struct ColumnWithTasks {
    #[serde(flatten)]
    pub column: ColumnView,

    /// Tasks ordered by position
    pub tasks: Vec<TaskDetails>,
}

/// Full board view
#[derive(Debug, Serialize)]
pub struct BoardDetail {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub owner: UserSummary,

    /// Members, owner excluded
    pub members: Vec<UserSummary>,

    /// Columns ordered by position
    pub columns: Vec<ColumnWithTasks>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BoardDetail {
    /// Loads members, columns and tasks of `board`
    pub async fn load(pool: &PgPool, board: Board) -> ApiResult<Self> {
        let owner = User::find_by_id(pool, board.owner_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Board not found".to_string()))?;

        let members = BoardMember::list_users(pool, board.id)
            .await?
            .iter()
            .map(User::summary)
            .collect();

        let columns = Column::list_by_board(pool, board.id).await?;
        let tasks = Task::with_details(pool, Task::list_by_board(pool, board.id).await?).await?;

        Ok(Self {
            id: board.id,
            title: board.title,
            description: board.description,
            owner: owner.summary(),
            members,
            columns: nest_tasks(columns, tasks),
            created_at: board.created_at,
            updated_at: board.updated_at,
        })
    }
}

/// Groups tasks under their columns, keeping both orders
fn nest_tasks(columns: Vec<Column>, tasks: Vec<TaskDetails>) -> Vec<ColumnWithTasks> {
    let mut by_column: HashMap<Uuid, Vec<TaskDetails>> = HashMap::new();
    for task in tasks {
        by_column.entry(task.task.column_id).or_default().push(task);
    }

    columns
        .into_iter()
        .map(|column| {
            let tasks = by_column.remove(&column.id).unwrap_or_default();
            ColumnWithTasks {
                column: column.into(),
                tasks,
            }
        })
        .collect()
}

/// Validates a requested member set for a board owned by `owner_id`
///
/// Returns the de-duplicated ids.
async fn check_member_ids(pool: &PgPool, owner_id: Uuid, member_ids: &[Uuid]) -> ApiResult<Vec<Uuid>> {
    let member_ids = dedup_ids(member_ids);

    if member_ids.contains(&owner_id) {
        return Err(ApiError::field(
            "members",
            "The board owner cannot be listed as a member",
        ));
    }

    let missing = User::missing_ids(pool, &member_ids).await?;
    if !missing.is_empty() {
        return Err(ApiError::field(
            "members",
            format!("Unknown users: {}", join_ids(&missing)),
        ));
    }

    Ok(member_ids)
}

/// List boards the user owns or belongs to
pub async fn list_boards(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<BoardSummary>>> {
    let boards = Board::list_for_user(&state.db, auth.user_id).await?;
    Ok(Json(boards))
}

/// Create a board
///
/// # Endpoint
///
/// ```text
/// POST /api/boards
/// Content-Type: application/json
///
/// { "title": "Sprint 1", "description": "", "members": ["uuid"] }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: blank title, unknown member ids, owner listed as member
pub async fn create_board(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(mut req): ApiJson<CreateBoardRequest>,
) -> ApiResult<(StatusCode, Json<BoardDetail>)> {
    trim_in_place(&mut req.title);
    trim_opt(&mut req.description);
    req.validate()?;

    let member_ids = check_member_ids(&state.db, auth.user_id, &req.members).await?;

    let board = Board::create(
        &state.db,
        CreateBoard {
            title: req.title,
            description: req.description.unwrap_or_default(),
            owner_id: auth.user_id,
            member_ids,
        },
    )
    .await?;

    let detail = BoardDetail::load(&state.db, board).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Get a board with members, columns and tasks
pub async fn get_board(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(board_id): ApiPath<Uuid>,
) -> ApiResult<Json<BoardDetail>> {
    require_board_permission(&state.db, board_id, auth.user_id, BoardPermission::Read).await?;

    let board = Board::find_by_id(&state.db, board_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Board not found".to_string()))?;

    Ok(Json(BoardDetail::load(&state.db, board).await?))
}

/// Update a board (owner only)
///
/// `members`, when present, replaces the member set. Users who lose
/// membership are unassigned from the board's tasks.
pub async fn update_board(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(board_id): ApiPath<Uuid>,
    ApiJson(mut req): ApiJson<UpdateBoardRequest>,
) -> ApiResult<Json<BoardDetail>> {
    let access =
        require_board_permission(&state.db, board_id, auth.user_id, BoardPermission::Manage).await?;

    trim_opt(&mut req.title);
    trim_opt(&mut req.description);
    req.validate()?;

    let member_ids = match req.members {
        Some(ids) => Some(check_member_ids(&state.db, access.owner_id, &ids).await?),
        None => None,
    };

    let board = Board::update(
        &state.db,
        board_id,
        UpdateBoard {
            title: req.title,
            description: req.description,
            member_ids,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Board not found".to_string()))?;

    Ok(Json(BoardDetail::load(&state.db, board).await?))
}

/// Delete a board with its columns, tasks and comments (owner only)
pub async fn delete_board(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(board_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    require_board_permission(&state.db, board_id, auth.user_id, BoardPermission::Manage).await?;

    if !Board::delete(&state.db, board_id).await? {
        return Err(ApiError::NotFound("Board not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Add a member (owner only)
///
/// Responds with the updated member list.
///
/// # Errors
///
/// - `400 Bad Request`: unknown user, or the owner
/// - `409 Conflict`: already a member
pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(board_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<Vec<UserSummary>>)> {
    let access =
        require_board_permission(&state.db, board_id, auth.user_id, BoardPermission::Manage).await?;

    if req.user_id == access.owner_id {
        return Err(ApiError::field(
            "user_id",
            "The board owner is already a participant",
        ));
    }

    if User::find_by_id(&state.db, req.user_id).await?.is_none() {
        return Err(ApiError::field("user_id", "Unknown user"));
    }

    match BoardMember::add(&state.db, board_id, req.user_id).await {
        Ok(_) => {}
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            return Err(ApiError::Conflict(
                "User is already a member of this board".to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    }

    let members = BoardMember::list_users(&state.db, board_id)
        .await?
        .iter()
        .map(User::summary)
        .collect();

    Ok((StatusCode::CREATED, Json(members)))
}

/// Remove a member
///
/// The owner removes anyone; a member may leave on their own. The removed
/// user's assignments on the board are released.
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath((board_id, member_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let access =
        require_board_permission(&state.db, board_id, auth.user_id, BoardPermission::Read).await?;

    require(
        can_remove_member(&access, auth.user_id, member_id),
        "remove this member",
    )?;

    if !BoardMember::remove(&state.db, board_id, member_id).await? {
        return Err(ApiError::NotFound(
            "User is not a member of this board".to_string(),
        ));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanmind_shared::models::{column::ColumnStatus, task::{TaskPriority, Task}};

    fn column(title: &str, position: i32) -> Column {
        Column {
            id: Uuid::new_v4(),
            board_id: Uuid::nil(),
            title: title.to_string(),
            position,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn task(column_id: Uuid, position: i32) -> TaskDetails {
        TaskDetails {
            task: Task {
                id: Uuid::new_v4(),
                board_id: Uuid::nil(),
                column_id,
                title: format!("Task {position}"),
                description: String::new(),
                priority: TaskPriority::default(),
                position,
                due_date: None,
                assignee_id: None,
                created_by: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            status: ColumnStatus::ToDo,
            assignee: None,
            reviewers: Vec::new(),
            comments_count: 0,
        }
    }

    #[test]
    fn test_nest_tasks_keeps_order() {
        let todo = column("To do", 0);
        let done = column("Done", 1);
        let empty = column("Review", 2);

        let tasks = vec![task(todo.id, 0), task(done.id, 0), task(todo.id, 1)];
        let expected: Vec<Uuid> = vec![tasks[0].task.id, tasks[2].task.id];

        let nested = nest_tasks(vec![todo, done, empty], tasks);

        assert_eq!(nested.len(), 3);
        assert_eq!(nested[0].tasks.iter().map(|t| t.task.id).collect::<Vec<_>>(), expected);
        assert_eq!(nested[1].tasks.len(), 1);
        assert!(nested[2].tasks.is_empty());
        assert_eq!(nested[2].column.status, ColumnStatus::Review);
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateBoardRequest = serde_json::from_str(r#"{"title": "Sprint 1"}"#).unwrap();
        assert!(req.members.is_empty());
        assert!(req.description.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_blank_title_rejected_after_trim() {
        let mut req: CreateBoardRequest = serde_json::from_str(r#"{"title": "   "}"#).unwrap();
        trim_in_place(&mut req.title);
        assert!(req.validate().is_err());
    }
}
