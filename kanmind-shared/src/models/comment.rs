/// Task comments
///
/// Comments are never edited. They disappear when their author deletes
/// them, when the board owner deletes them, or with their task.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE comments (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
///     author_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     content TEXT NOT NULL CHECK (char_length(content) > 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::user::{User, UserSummary};

/// Comment row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    /// Comment ID
    pub id: Uuid,

    /// Commented task
    pub task_id: Uuid,

    /// Author
    pub author_id: Uuid,

    /// Text
    pub content: String,

    /// When the comment was posted
    pub created_at: DateTime<Utc>,

    /// Equal to `created_at`; comments are not edited
    pub updated_at: DateTime<Utc>,
}

/// A comment with its author's summary
#[derive(Debug, Clone, Serialize)]
pub struct CommentDetails {
    /// Comment ID
    pub id: Uuid,

    /// Commented task
    pub task_id: Uuid,

    /// Author summary
    pub author: UserSummary,

    /// Text
    pub content: String,

    /// When the comment was posted
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Posts a comment
    pub async fn create(
        pool: &PgPool,
        task_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> Result<Self, sqlx::Error> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (task_id, author_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, task_id, author_id, content, created_at, updated_at
            "#,
        )
        .bind(task_id)
        .bind(author_id)
        .bind(content)
        .fetch_one(pool)
        .await?;

        tracing::info!(comment_id = %comment.id, task_id = %task_id, "Comment added");
        Ok(comment)
    }

    /// Finds a comment of a given task
    ///
    /// A comment id paired with the wrong task resolves to `None`.
    pub async fn find(
        pool: &PgPool,
        task_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, task_id, author_id, content, created_at, updated_at
            FROM comments
            WHERE id = $1 AND task_id = $2
            "#,
        )
        .bind(id)
        .bind(task_id)
        .fetch_optional(pool)
        .await
    }

    /// Comments of a task, oldest first
    pub async fn list_by_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, task_id, author_id, content, created_at, updated_at
            FROM comments
            WHERE task_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    /// Deletes a comment
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!(comment_id = %id, "Comment deleted");
        }

        Ok(result.rows_affected() > 0)
    }

    /// Attaches author summaries, keeping input order
    pub async fn with_authors(
        pool: &PgPool,
        comments: Vec<Comment>,
    ) -> Result<Vec<CommentDetails>, sqlx::Error> {
        let mut author_ids: Vec<Uuid> = comments.iter().map(|c| c.author_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();

        let authors: HashMap<Uuid, UserSummary> = User::find_many(pool, &author_ids)
            .await?
            .iter()
            .map(|u| (u.id, u.summary()))
            .collect();

        // Authors cascade with their comments, so a missing author only
        // happens inside a concurrent account deletion; skip those rows.
        Ok(comments
            .into_iter()
            .filter_map(|c| {
                let author = authors.get(&c.author_id)?.clone();
                Some(CommentDetails {
                    id: c.id,
                    task_id: c.task_id,
                    author,
                    content: c.content,
                    created_at: c.created_at,
                })
            })
            .collect())
    }
}
