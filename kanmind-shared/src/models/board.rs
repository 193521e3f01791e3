/// Board model and database operations
///
/// A board is owned by the user who created it and shared with a set of
/// members. The owner is never stored in `board_members`; the two are
/// combined into "participants" wherever access or assignment is checked.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE boards (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     title VARCHAR(100) NOT NULL CHECK (char_length(title) > 0),
///     description TEXT NOT NULL DEFAULT '',
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Deleting a board cascades to its members, columns, tasks, reviewers and
/// comments.
///
/// # Roles
///
/// - **owner**: everything, including membership changes and deletion
/// - **member**: read the board and work with its columns, tasks and comments
///
/// # Example
///
/// ```no_run
/// use kanmind_shared::models::board::{Board, CreateBoard};
/// use sqlx::{PgConnection, PgPool};
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, owner_id: Uuid, teammate: Uuid) -> Result<(), sqlx::Error> {
/// let board = Board::create(&pool, CreateBoard {
///     title: "Sprint 1".to_string(),
///     description: String::new(),
///     owner_id,
///     member_ids: vec![teammate],
/// }).await?;
///
/// let access = Board::access_for(&pool, board.id, teammate).await?;
/// assert!(access.and_then(|a| a.role).is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::board_member::BoardMember;
use super::column::ColumnStatus;

/// A user's standing on a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardRole {
    /// Created the board
    Owner,

    /// Invited by the owner
    Member,
}

impl BoardRole {
    /// Converts role to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardRole::Owner => "owner",
            BoardRole::Member => "member",
        }
    }

    /// Owner-only actions: edit or delete the board, manage members
    pub fn can_manage_board(&self) -> bool {
        matches!(self, BoardRole::Owner)
    }

    /// Checks if this role reaches the level of `required`
    pub fn has_permission(&self, required: &BoardRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    fn permission_level(&self) -> u8 {
        match self {
            BoardRole::Owner => 2,
            BoardRole::Member => 1,
        }
    }
}

/// Row lock taken on a board inside a transaction
///
/// Membership changes and column layout changes hold `Exclusive`. Task
/// writes that depend on who the participants are hold `Shared`, so they
/// never interleave with a member leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardLock {
    /// `FOR SHARE`
    Shared,

    /// `FOR UPDATE`
    Exclusive,
}

/// Board row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Board {
    /// Board ID
    pub id: Uuid,

    /// Board title (1-100 characters)
    pub title: String,

    /// Free-form description
    pub description: String,

    /// Creating user
    pub owner_id: Uuid,

    /// When the board was created
    pub created_at: DateTime<Utc>,

    /// When the board was last edited
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a board
#[derive(Debug, Clone)]
pub struct CreateBoard {
    /// Board title
    pub title: String,

    /// Description
    pub description: String,

    /// Requesting user, who becomes the owner
    pub owner_id: Uuid,

    /// Initial members (must exist and must not include the owner)
    pub member_ids: Vec<Uuid>,
}

/// Board changes
#[derive(Debug, Clone, Default)]
pub struct UpdateBoard {
    /// New title
    pub title: Option<String>,

    /// New description
    pub description: Option<String>,

    /// Replacement member set
    pub member_ids: Option<Vec<Uuid>>,
}

/// A row of the board list with aggregate counters
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BoardSummary {
    /// Board ID
    pub id: Uuid,

    /// Board title
    pub title: String,

    /// Description
    pub description: String,

    /// Owner ID
    pub owner_id: Uuid,

    /// Members plus the owner
    pub member_count: i64,

    /// All tasks on the board
    pub ticket_count: i64,

    /// Tasks sitting in a to-do column
    #[sqlx(default)]
    pub tasks_to_do_count: i64,

    /// Tasks with high priority
    pub tasks_high_prio_count: i64,

    /// When the board was created
    pub created_at: DateTime<Utc>,

    /// When the board was last edited
    pub updated_at: DateTime<Utc>,
}

/// Who owns a board and how a given user relates to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardAccess {
    /// Board ID
    pub board_id: Uuid,

    /// Board owner
    pub owner_id: Uuid,

    /// The user's role, `None` when they are not a participant
    pub role: Option<BoardRole>,
}

impl BoardAccess {
    /// True when the user owns the board
    pub fn is_owner(&self) -> bool {
        self.role == Some(BoardRole::Owner)
    }
}

impl Board {
    /// Creates a board with its initial members in one transaction
    ///
    /// # Errors
    ///
    /// Fails with a foreign key violation when a member id does not exist.
    pub async fn create(pool: &PgPool, data: CreateBoard) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let board = sqlx::query_as::<_, Board>(
            r#"
            INSERT INTO boards (title, description, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, title, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(data.title)
        .bind(data.description)
        .bind(data.owner_id)
        .fetch_one(&mut *tx)
        .await?;

        BoardMember::replace_all(&mut tx, board.id, &data.member_ids).await?;

        tx.commit().await?;

        tracing::info!(
            board_id = %board.id,
            owner_id = %board.owner_id,
            members = data.member_ids.len(),
            "Board created"
        );
        Ok(board)
    }

    /// Finds a board by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(
            r#"
            SELECT id, title, description, owner_id, created_at, updated_at
            FROM boards
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Resolves the owner of `board_id` and the role of `user_id` on it
    ///
    /// Returns `None` when the board does not exist.
    pub async fn access_for(
        pool: &PgPool,
        board_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<BoardAccess>, sqlx::Error> {
        let row: Option<(Uuid, bool)> = sqlx::query_as(
            r#"
            SELECT b.owner_id,
                   EXISTS (
                       SELECT 1 FROM board_members m
                       WHERE m.board_id = b.id AND m.user_id = $2
                   )
            FROM boards b
            WHERE b.id = $1
            "#,
        )
        .bind(board_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(owner_id, is_member)| BoardAccess {
            board_id,
            owner_id,
            role: if owner_id == user_id {
                Some(BoardRole::Owner)
            } else if is_member {
                Some(BoardRole::Member)
            } else {
                None
            },
        }))
    }

    /// Lists the boards `user_id` owns or belongs to, newest first
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<BoardSummary>, sqlx::Error> {
        let mut summaries = sqlx::query_as::<_, BoardSummary>(
            r#"
            SELECT b.id, b.title, b.description, b.owner_id,
                   1 + (SELECT COUNT(*) FROM board_members m WHERE m.board_id = b.id) AS member_count,
                   (SELECT COUNT(*) FROM tasks t WHERE t.board_id = b.id) AS ticket_count,
                   (SELECT COUNT(*) FROM tasks t
                    WHERE t.board_id = b.id AND t.priority = 'high') AS tasks_high_prio_count,
                   b.created_at, b.updated_at
            FROM boards b
            WHERE b.owner_id = $1
               OR EXISTS (
                   SELECT 1 FROM board_members m
                   WHERE m.board_id = b.id AND m.user_id = $1
               )
            ORDER BY b.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        if summaries.is_empty() {
            return Ok(summaries);
        }

        let board_ids: Vec<Uuid> = summaries.iter().map(|s| s.id).collect();

        // Column status comes from the title, so to-do counts are summed here
        // rather than in SQL.
        let per_column: Vec<(Uuid, String, i64)> = sqlx::query_as(
            r#"
            SELECT c.board_id, c.title, COUNT(t.id)
            FROM columns c
            LEFT JOIN tasks t ON t.column_id = c.id
            WHERE c.board_id = ANY($1)
            GROUP BY c.id
            "#,
        )
        .bind(&board_ids)
        .fetch_all(pool)
        .await?;

        let mut to_do: HashMap<Uuid, i64> = HashMap::new();
        for (board_id, title, count) in per_column {
            if ColumnStatus::from_title(&title) == ColumnStatus::ToDo {
                *to_do.entry(board_id).or_default() += count;
            }
        }

        for summary in &mut summaries {
            summary.tasks_to_do_count = to_do.get(&summary.id).copied().unwrap_or(0);
        }

        Ok(summaries)
    }

    /// Updates title, description and optionally the member set
    ///
    /// Members dropped by a replacement lose their assignments on this
    /// board in the same transaction. Returns `None` when the board does
    /// not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateBoard,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if !Board::lock(&mut tx, id, BoardLock::Exclusive).await? {
            return Ok(None);
        }

        let board = sqlx::query_as::<_, Board>(
            r#"
            UPDATE boards
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, title, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.title)
        .bind(data.description)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(board) = board else {
            return Ok(None);
        };

        if let Some(member_ids) = data.member_ids {
            BoardMember::replace_all(&mut tx, board.id, &member_ids).await?;
        }

        tx.commit().await?;

        tracing::info!(board_id = %board.id, "Board updated");
        Ok(Some(board))
    }

    /// Deletes a board and everything nested under it
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM boards WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!(board_id = %id, "Board deleted");
        }

        Ok(result.rows_affected() > 0)
    }

    /// Locks the board row until the surrounding transaction ends
    ///
    /// Returns false when the board does not exist.
    pub async fn lock(conn: &mut PgConnection, id: Uuid, lock: BoardLock) -> Result<bool, sqlx::Error> {
        let query = match lock {
            BoardLock::Shared => "SELECT id FROM boards WHERE id = $1 FOR SHARE",
            BoardLock::Exclusive => "SELECT id FROM boards WHERE id = $1 FOR UPDATE",
        };

        let locked: Option<Uuid> = sqlx::query_scalar(query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(locked.is_some())
    }

    /// Owner plus members of a board
    ///
    /// Runs on the caller's connection; hold a [`BoardLock`] first when the
    /// answer guards a write.
    pub async fn participant_ids(conn: &mut PgConnection, board_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT owner_id FROM boards WHERE id = $1
            UNION
            SELECT user_id FROM board_members WHERE board_id = $1
            "#,
        )
        .bind(board_id)
        .fetch_all(&mut *conn)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(BoardRole::Owner.has_permission(&BoardRole::Member));
        assert!(BoardRole::Owner.has_permission(&BoardRole::Owner));
        assert!(BoardRole::Member.has_permission(&BoardRole::Member));
        assert!(!BoardRole::Member.has_permission(&BoardRole::Owner));
    }

    #[test]
    fn test_only_owner_manages_board() {
        assert!(BoardRole::Owner.can_manage_board());
        assert!(!BoardRole::Member.can_manage_board());
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&BoardRole::Owner).unwrap(), "\"owner\"");
        assert_eq!(BoardRole::Member.as_str(), "member");
    }

    #[test]
    fn test_board_access_is_owner() {
        let access = BoardAccess {
            board_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            role: Some(BoardRole::Owner),
        };
        assert!(access.is_owner());

        let outsider = BoardAccess { role: None, ..access };
        assert!(!outsider.is_owner());
    }
}
