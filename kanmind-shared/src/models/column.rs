/// Column model and database operations
///
/// Columns order the tasks of a board. Positions are dense (`0..n`) within
/// a board; the uniqueness constraint is deferred so a reorder can rewrite
/// all positions inside one transaction. Every operation that assigns or
/// shifts positions holds [`BoardLock::Exclusive`] on the board.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE columns (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     board_id UUID NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
///     title VARCHAR(50) NOT NULL CHECK (char_length(title) > 0),
///     position INTEGER NOT NULL CHECK (position >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT columns_board_position_key UNIQUE (board_id, position) DEFERRABLE INITIALLY DEFERRED,
///     CONSTRAINT columns_id_board_key UNIQUE (id, board_id)
/// );
/// ```
///
/// # Status
///
/// Tasks have no status field of their own. Their status is the status of
/// their column, which is read from the column title (see
/// [`ColumnStatus::from_title`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use super::board::{Board, BoardLock};

/// Workflow stage implied by a column title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnStatus {
    /// Not started
    ToDo,

    /// Being worked on
    InProgress,

    /// Waiting for review
    Review,

    /// Finished
    Done,
}

impl ColumnStatus {
    /// Derives the status from a column title
    ///
    /// Matching is case-insensitive and checked in this order: "todo",
    /// "to do" or "to-do"; "progress" or "doing"; "review"; "done" or
    /// "complete". Anything else counts as to-do.
    pub fn from_title(title: &str) -> Self {
        let title = title.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| title.contains(n));

        if has(&["todo", "to do", "to-do"]) {
            ColumnStatus::ToDo
        } else if has(&["progress", "doing"]) {
            ColumnStatus::InProgress
        } else if has(&["review"]) {
            ColumnStatus::Review
        } else if has(&["done", "complete"]) {
            ColumnStatus::Done
        } else {
            ColumnStatus::ToDo
        }
    }
}

/// Column row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Column {
    /// Column ID
    pub id: Uuid,

    /// Owning board
    pub board_id: Uuid,

    /// Column title (1-50 characters)
    pub title: String,

    /// Zero-based position among the board's columns
    pub position: i32,

    /// When the column was created
    pub created_at: DateTime<Utc>,

    /// When the column was last renamed or moved
    pub updated_at: DateTime<Utc>,
}

/// True when `requested` names every id in `current` exactly once
pub fn is_permutation(current: &[Uuid], requested: &[Uuid]) -> bool {
    if current.len() != requested.len() {
        return false;
    }

    let requested_set: HashSet<&Uuid> = requested.iter().collect();
    requested_set.len() == requested.len() && current.iter().all(|id| requested_set.contains(id))
}

impl Column {
    /// Status of the tasks in this column
    pub fn status(&self) -> ColumnStatus {
        ColumnStatus::from_title(&self.title)
    }

    /// Appends a column to the end of a board
    ///
    /// # Errors
    ///
    /// Fails with a foreign key violation when the board does not exist.
    pub async fn create(pool: &PgPool, board_id: Uuid, title: &str) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;
        Board::lock(&mut tx, board_id, BoardLock::Exclusive).await?;

        let column = sqlx::query_as::<_, Column>(
            r#"
            INSERT INTO columns (board_id, title, position)
            SELECT $1, $2, COALESCE(MAX(position) + 1, 0)
            FROM columns
            WHERE board_id = $1
            RETURNING id, board_id, title, position, created_at, updated_at
            "#,
        )
        .bind(board_id)
        .bind(title)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(board_id = %board_id, column_id = %column.id, position = column.position, "Column created");
        Ok(column)
    }

    /// Finds a column by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Column>(
            r#"
            SELECT id, board_id, title, position, created_at, updated_at
            FROM columns
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Columns of a board in display order
    pub async fn list_by_board(pool: &PgPool, board_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Column>(
            r#"
            SELECT id, board_id, title, position, created_at, updated_at
            FROM columns
            WHERE board_id = $1
            ORDER BY position
            "#,
        )
        .bind(board_id)
        .fetch_all(pool)
        .await
    }

    /// Renames a column
    pub async fn rename(pool: &PgPool, id: Uuid, title: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Column>(
            r#"
            UPDATE columns
            SET title = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, board_id, title, position, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(title)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a column with its tasks and closes the position gap
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let board_id: Option<Uuid> = sqlx::query_scalar("SELECT board_id FROM columns WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(board_id) = board_id else {
            return Ok(false);
        };
        Board::lock(&mut tx, board_id, BoardLock::Exclusive).await?;

        let deleted: Option<(Uuid, i32)> =
            sqlx::query_as("DELETE FROM columns WHERE id = $1 RETURNING board_id, position")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((board_id, position)) = deleted else {
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE columns
            SET position = position - 1
            WHERE board_id = $1 AND position > $2
            "#,
        )
        .bind(board_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(board_id = %board_id, column_id = %id, "Column deleted");
        Ok(true)
    }

    /// Rewrites column positions to follow `ordered_ids`
    ///
    /// Returns `None` without changing anything when `ordered_ids` is not a
    /// permutation of the board's columns.
    pub async fn reorder(
        pool: &PgPool,
        board_id: Uuid,
        ordered_ids: &[Uuid],
    ) -> Result<Option<Vec<Self>>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if !Board::lock(&mut tx, board_id, BoardLock::Exclusive).await? {
            return Ok(None);
        }

        let current: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM columns WHERE board_id = $1 FOR UPDATE")
                .bind(board_id)
                .fetch_all(&mut *tx)
                .await?;

        if !is_permutation(&current, ordered_ids) {
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE columns c
            SET position = (o.ord - 1)::int, updated_at = NOW()
            FROM UNNEST($2::uuid[]) WITH ORDINALITY AS o(id, ord)
            WHERE c.id = o.id AND c.board_id = $1 AND c.position <> (o.ord - 1)::int
            "#,
        )
        .bind(board_id)
        .bind(ordered_ids)
        .execute(&mut *tx)
        .await?;

        let columns = sqlx::query_as::<_, Column>(
            r#"
            SELECT id, board_id, title, position, created_at, updated_at
            FROM columns
            WHERE board_id = $1
            ORDER BY position
            "#,
        )
        .bind(board_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(board_id = %board_id, columns = columns.len(), "Columns reordered");
        Ok(Some(columns))
    }
}
