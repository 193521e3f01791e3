/// Column endpoints
///
/// Any participant of a board may manage its columns.
///
/// # Endpoints
///
/// - `GET /api/boards/:id/columns` - Columns ordered by position
/// - `POST /api/boards/:id/columns` - Append a column
/// - `PUT /api/boards/:id/columns/order` - Reorder all columns at once
/// - `GET /api/columns/:id` - One column
/// - `PATCH /api/columns/:id` - Rename
/// - `DELETE /api/columns/:id` - Delete with its tasks

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath},
    routes::trim_in_place,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use kanmind_shared::{
    auth::{
        authorization::{require_board_permission, BoardPermission},
        middleware::AuthContext,
    },
    models::column::{Column, ColumnStatus},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Column with its derived status
#[derive(Debug, Serialize)]
pub struct ColumnView {
    #[serde(flatten)]
    pub column: Column,

    pub status: ColumnStatus,
}

impl From<Column> for ColumnView {
    fn from(column: Column) -> Self {
        let status = column.status();
        Self { column, status }
    }
}

/// Create or rename request
#[derive(Debug, Deserialize, Validate)]
pub struct ColumnRequest {
    #[validate(length(min = 1, max = 50, message = "Title must be 1 to 50 characters"))]
    pub title: String,
}

/// Reorder request
#[derive(Debug, Deserialize)]
pub struct ReorderColumnsRequest {
    /// Every column of the board, in the new order
    pub column_ids: Vec<Uuid>,
}

/// Loads a column and checks `permission` on its board
async fn authorized_column(
    pool: &PgPool,
    column_id: Uuid,
    user_id: Uuid,
    permission: BoardPermission,
) -> ApiResult<Column> {
    let column = Column::find_by_id(pool, column_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Column not found".to_string()))?;

    require_board_permission(pool, column.board_id, user_id, permission).await?;
    Ok(column)
}

/// List the columns of a board
pub async fn list_columns(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(board_id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<ColumnView>>> {
    require_board_permission(&state.db, board_id, auth.user_id, BoardPermission::Read).await?;

    let columns = Column::list_by_board(&state.db, board_id).await?;
    Ok(Json(columns.into_iter().map(ColumnView::from).collect()))
}

/// Append a column to a board
pub async fn create_column(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(board_id): ApiPath<Uuid>,
    ApiJson(mut req): ApiJson<ColumnRequest>,
) -> ApiResult<(StatusCode, Json<ColumnView>)> {
    require_board_permission(&state.db, board_id, auth.user_id, BoardPermission::Write).await?;

    trim_in_place(&mut req.title);
    req.validate()?;

    let column = Column::create(&state.db, board_id, &req.title).await?;
    Ok((StatusCode::CREATED, Json(column.into())))
}

/// Reorder the columns of a board
///
/// `column_ids` must list every column of the board exactly once.
pub async fn reorder_columns(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(board_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReorderColumnsRequest>,
) -> ApiResult<Json<Vec<ColumnView>>> {
    require_board_permission(&state.db, board_id, auth.user_id, BoardPermission::Write).await?;

    let columns = Column::reorder(&state.db, board_id, &req.column_ids)
        .await?
        .ok_or_else(|| {
            ApiError::field(
                "column_ids",
                "Must list every column of the board exactly once",
            )
        })?;

    Ok(Json(columns.into_iter().map(ColumnView::from).collect()))
}

/// Get one column
pub async fn get_column(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(column_id): ApiPath<Uuid>,
) -> ApiResult<Json<ColumnView>> {
    let column = authorized_column(&state.db, column_id, auth.user_id, BoardPermission::Read).await?;
    Ok(Json(column.into()))
}

/// Rename a column
pub async fn rename_column(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(column_id): ApiPath<Uuid>,
    ApiJson(mut req): ApiJson<ColumnRequest>,
) -> ApiResult<Json<ColumnView>> {
    authorized_column(&state.db, column_id, auth.user_id, BoardPermission::Write).await?;

    trim_in_place(&mut req.title);
    req.validate()?;

    let column = Column::rename(&state.db, column_id, &req.title)
        .await?
        .ok_or_else(|| ApiError::NotFound("Column not found".to_string()))?;

    Ok(Json(column.into()))
}

/// Delete a column and its tasks
pub async fn delete_column(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(column_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    authorized_column(&state.db, column_id, auth.user_id, BoardPermission::Write).await?;

    if !Column::delete(&state.db, column_id).await? {
        return Err(ApiError::NotFound("Column not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
