/// Board membership
///
/// # Schema
///
/// ```sql
/// CREATE TABLE board_members (
///     board_id UUID NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (board_id, user_id)
/// );
/// ```
///
/// Assignee and reviewer slots may only point at participants. Every path
/// that takes membership away therefore releases the user's assignments on
/// that board inside the same transaction, while holding
/// [`BoardLock::Exclusive`] on the board. Task writes check participants
/// under [`BoardLock::Shared`], so the two never interleave.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::board::{Board, BoardLock};
use super::user::User;

/// Membership row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BoardMember {
    /// Board ID
    pub board_id: Uuid,

    /// Member user ID
    pub user_id: Uuid,

    /// When the user joined the board
    pub joined_at: DateTime<Utc>,
}

impl BoardMember {
    /// Adds a member
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on `board_members_pkey` when the user
    /// is already a member, and with a foreign key violation when the board
    /// or user does not exist.
    pub async fn add(pool: &PgPool, board_id: Uuid, user_id: Uuid) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;
        Board::lock(&mut tx, board_id, BoardLock::Exclusive).await?;

        let member = sqlx::query_as::<_, BoardMember>(
            r#"
            INSERT INTO board_members (board_id, user_id)
            VALUES ($1, $2)
            RETURNING board_id, user_id, joined_at
            "#,
        )
        .bind(board_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(board_id = %board_id, user_id = %user_id, "Board member added");
        Ok(member)
    }

    /// Removes a member and releases their assignments on the board
    ///
    /// Returns false when the user was not a member.
    pub async fn remove(pool: &PgPool, board_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if !Board::lock(&mut tx, board_id, BoardLock::Exclusive).await? {
            return Ok(false);
        }

        let result = sqlx::query("DELETE FROM board_members WHERE board_id = $1 AND user_id = $2")
            .bind(board_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        release_assignments(&mut tx, board_id, &[user_id]).await?;
        tx.commit().await?;

        tracing::info!(board_id = %board_id, user_id = %user_id, "Board member removed");
        Ok(true)
    }

    /// Users who are members of a board, owner excluded, ordered by email
    pub async fn list_users(pool: &PgPool, board_id: Uuid) -> Result<Vec<User>, sqlx::Error> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM board_members WHERE board_id = $1")
                .bind(board_id)
                .fetch_all(pool)
                .await?;

        User::find_many(pool, &ids).await
    }

    /// Makes `user_ids` the exact member set of a board
    ///
    /// Runs on the caller's connection so it can join a surrounding
    /// transaction, and locks the board row for the rest of it.
    pub async fn replace_all(
        conn: &mut PgConnection,
        board_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        Board::lock(&mut *conn, board_id, BoardLock::Exclusive).await?;

        let removed: Vec<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM board_members
            WHERE board_id = $1 AND NOT (user_id = ANY($2))
            RETURNING user_id
            "#,
        )
        .bind(board_id)
        .bind(user_ids)
        .fetch_all(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO board_members (board_id, user_id)
            SELECT $1, requested.id
            FROM UNNEST($2::uuid[]) AS requested(id)
            ON CONFLICT (board_id, user_id) DO NOTHING
            "#,
        )
        .bind(board_id)
        .bind(user_ids)
        .execute(&mut *conn)
        .await?;

        if !removed.is_empty() {
            release_assignments(conn, board_id, &removed).await?;
        }

        Ok(())
    }
}

/// Clears assignee slots and reviewer rows held by `user_ids` on a board
async fn release_assignments(
    conn: &mut PgConnection,
    board_id: Uuid,
    user_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    let unassigned = sqlx::query(
        r#"
        UPDATE tasks
        SET assignee_id = NULL, updated_at = NOW()
        WHERE board_id = $1 AND assignee_id = ANY($2)
        "#,
    )
    .bind(board_id)
    .bind(user_ids)
    .execute(&mut *conn)
    .await?;

    let unreviewed = sqlx::query(
        r#"
        DELETE FROM task_reviewers r
        USING tasks t
        WHERE r.task_id = t.id AND t.board_id = $1 AND r.user_id = ANY($2)
        "#,
    )
    .bind(board_id)
    .bind(user_ids)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        board_id = %board_id,
        users = user_ids.len(),
        unassigned = unassigned.rows_affected(),
        unreviewed = unreviewed.rows_affected(),
        "Released assignments of departing members"
    );

    Ok(())
}
