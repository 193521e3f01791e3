/// Task model and database operations
///
/// A task lives in one column of one board. `board_id` is stored next to
/// `column_id` and a composite foreign key on `(column_id, board_id)` keeps
/// the two consistent, so a task can move between columns of its board but
/// never to another board.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_priority AS ENUM ('low', 'medium', 'high');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     board_id UUID NOT NULL,
///     column_id UUID NOT NULL,
///     title VARCHAR(200) NOT NULL CHECK (char_length(title) > 0),
///     description TEXT NOT NULL DEFAULT '',
///     priority task_priority NOT NULL DEFAULT 'medium',
///     position INTEGER NOT NULL DEFAULT 0 CHECK (position >= 0),
///     due_date DATE,
///     assignee_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     FOREIGN KEY (column_id, board_id) REFERENCES columns(id, board_id) ON DELETE CASCADE
/// );
///
/// CREATE TABLE task_reviewers (
///     task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     PRIMARY KEY (task_id, user_id)
/// );
/// ```
///
/// The database does not know who may be assigned. [`Task::create`] and
/// [`Task::update`] check that the assignee and reviewers are participants
/// of the board inside their own transaction, under
/// [`BoardLock::Shared`](super::board::BoardLock), and fail with
/// [`TaskWriteError::NotParticipants`] otherwise.
///
/// # Example
///
/// ```no_run
/// use kanmind_shared::models::task::{CreateTask, Task, TaskPriority};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, board_id: Uuid, column_id: Uuid, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let task = Task::create(&pool, CreateTask {
///     board_id,
///     column_id,
///     title: "Write release notes".to_string(),
///     description: String::new(),
///     priority: TaskPriority::High,
///     due_date: None,
///     assignee_id: Some(user_id),
///     reviewer_ids: vec![],
///     created_by: user_id,
/// }).await?;
///
/// let details = Task::with_details(&pool, vec![task]).await?;
/// assert_eq!(details[0].comments_count, 0);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::board::{Board, BoardLock};
use super::column::ColumnStatus;
use super::user::{User, UserSummary};

const TASK_COLUMNS: &str = "id, board_id, column_id, title, description, priority, position, \
                            due_date, assignee_id, created_by, created_at, updated_at";

/// Error type for task writes
#[derive(Debug, thiserror::Error)]
pub enum TaskWriteError {
    /// The assignee or some reviewers are not participants of the board
    #[error("Users are not participants of board {board_id}")]
    NotParticipants {
        /// Board the task belongs to
        board_id: Uuid,

        /// Requested assignee when they are not a participant
        assignee_id: Option<Uuid>,

        /// Requested reviewers who are not participants
        reviewer_ids: Vec<Uuid>,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Can wait
    Low,

    /// Default priority
    #[default]
    Medium,

    /// Needs attention first
    High,
}

/// Task row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Task ID
    pub id: Uuid,

    /// Board the task belongs to
    pub board_id: Uuid,

    /// Column the task sits in
    pub column_id: Uuid,

    /// Title (1-200 characters)
    pub title: String,

    /// Free-form description
    pub description: String,

    /// Priority
    pub priority: TaskPriority,

    /// Zero-based position within the column
    pub position: i32,

    /// Optional due date
    pub due_date: Option<NaiveDate>,

    /// Assigned participant
    pub assignee_id: Option<Uuid>,

    /// User who created the task (None once that account is gone)
    pub created_by: Option<Uuid>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last changed
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task
#[derive(Debug, Clone)]
pub struct CreateTask {
    /// Board of `column_id`
    pub board_id: Uuid,

    /// Target column
    pub column_id: Uuid,

    /// Title
    pub title: String,

    /// Description
    pub description: String,

    /// Priority
    pub priority: TaskPriority,

    /// Due date
    pub due_date: Option<NaiveDate>,

    /// Assignee (must be a participant)
    pub assignee_id: Option<Uuid>,

    /// Reviewers (must be participants, duplicates are ignored)
    pub reviewer_ids: Vec<Uuid>,

    /// Requesting user
    pub created_by: Uuid,
}

/// Task changes
///
/// Nullable fields use `Option<Option<_>>`: the outer `None` leaves the
/// field alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    /// New title
    pub title: Option<String>,

    /// New description
    pub description: Option<String>,

    /// New priority
    pub priority: Option<TaskPriority>,

    /// New or cleared due date
    pub due_date: Option<Option<NaiveDate>>,

    /// New or cleared assignee
    pub assignee_id: Option<Option<Uuid>>,

    /// Replacement reviewer set
    pub reviewer_ids: Option<Vec<Uuid>>,

    /// Target column on the same board
    pub column_id: Option<Uuid>,

    /// Target position; omitted on a column change means "append"
    pub position: Option<i32>,
}

/// A task with everything a client renders alongside it
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetails {
    /// The task row
    #[serde(flatten)]
    pub task: Task,

    /// Status derived from the column title
    pub status: ColumnStatus,

    /// Assignee summary
    pub assignee: Option<UserSummary>,

    /// Reviewer summaries
    pub reviewers: Vec<UserSummary>,

    /// Number of comments
    pub comments_count: i64,
}

/// Removes duplicate ids while keeping first-seen order
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Fails with `NotParticipants` naming every requested user outside `participants`
pub fn check_participants(
    board_id: Uuid,
    participants: &[Uuid],
    assignee_id: Option<Uuid>,
    reviewer_ids: &[Uuid],
) -> Result<(), TaskWriteError> {
    let assignee_id = assignee_id.filter(|id| !participants.contains(id));
    let reviewer_ids: Vec<Uuid> = reviewer_ids
        .iter()
        .copied()
        .filter(|id| !participants.contains(id))
        .collect();

    if assignee_id.is_none() && reviewer_ids.is_empty() {
        Ok(())
    } else {
        Err(TaskWriteError::NotParticipants {
            board_id,
            assignee_id,
            reviewer_ids,
        })
    }
}

impl Task {
    /// Creates a task at the end of its column, with reviewers
    ///
    /// # Errors
    ///
    /// - `NotParticipants` when the assignee or a reviewer is neither owner
    ///   nor member of the board
    /// - a foreign key violation when the column does not belong to
    ///   `board_id`
    pub async fn create(pool: &PgPool, data: CreateTask) -> Result<Self, TaskWriteError> {
        let mut tx = pool.begin().await?;

        let reviewer_ids = dedup_ids(&data.reviewer_ids);
        Board::lock(&mut tx, data.board_id, BoardLock::Shared).await?;
        ensure_participants(&mut tx, data.board_id, data.assignee_id, &reviewer_ids).await?;
        lock_column(&mut tx, data.column_id).await?;

        let query = format!(
            r#"
            INSERT INTO tasks (board_id, column_id, title, description, priority, position,
                               due_date, assignee_id, created_by)
            SELECT $1, $2, $3, $4, $5,
                   COALESCE((SELECT MAX(position) + 1 FROM tasks WHERE column_id = $2), 0),
                   $6, $7, $8
            RETURNING {TASK_COLUMNS}
            "#
        );

        let task = sqlx::query_as::<_, Task>(&query)
            .bind(data.board_id)
            .bind(data.column_id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.priority)
            .bind(data.due_date)
            .bind(data.assignee_id)
            .bind(data.created_by)
            .fetch_one(&mut *tx)
            .await?;

        set_reviewers(&mut tx, task.id, &reviewer_ids).await?;

        tx.commit().await?;

        tracing::info!(
            task_id = %task.id,
            board_id = %task.board_id,
            column_id = %task.column_id,
            "Task created"
        );
        Ok(task)
    }

    /// Finds a task by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1");

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Tasks of a board ordered by column, then position
    pub async fn list_by_board(pool: &PgPool, board_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT t.id, t.board_id, t.column_id, t.title, t.description, t.priority,
                   t.position, t.due_date, t.assignee_id, t.created_by,
                   t.created_at, t.updated_at
            FROM tasks t
            JOIN columns c ON c.id = t.column_id
            WHERE t.board_id = $1
            ORDER BY c.position, t.position, t.created_at
            "#,
        )
        .bind(board_id)
        .fetch_all(pool)
        .await
    }

    /// Tasks assigned to `user_id`, earliest due date first
    pub async fn list_assigned_to(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE assignee_id = $1
            ORDER BY due_date ASC NULLS LAST, created_at DESC
            "#
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Tasks `user_id` reviews, earliest due date first
    pub async fn list_reviewing(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT t.id, t.board_id, t.column_id, t.title, t.description, t.priority,
                   t.position, t.due_date, t.assignee_id, t.created_by,
                   t.created_at, t.updated_at
            FROM tasks t
            JOIN task_reviewers r ON r.task_id = t.id
            WHERE r.user_id = $1
            ORDER BY t.due_date ASC NULLS LAST, t.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Applies changes to a task
    ///
    /// Moving to another column without a position appends the task there.
    /// Returns `None` when the task does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, TaskWriteError> {
        let mut tx = pool.begin().await?;

        let board_id: Option<Uuid> = sqlx::query_scalar("SELECT board_id FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(board_id) = board_id else {
            return Ok(None);
        };

        let reviewer_ids = data.reviewer_ids.as_deref().map(dedup_ids);
        Board::lock(&mut tx, board_id, BoardLock::Shared).await?;
        ensure_participants(
            &mut tx,
            board_id,
            data.assignee_id.flatten(),
            reviewer_ids.as_deref().unwrap_or_default(),
        )
        .await?;

        if let Some(column_id) = data.column_id {
            lock_column(&mut tx, column_id).await?;
        }

        let query = format!(
            r#"
            UPDATE tasks
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                priority = COALESCE($4, priority),
                due_date = CASE WHEN $5 THEN $6 ELSE due_date END,
                assignee_id = CASE WHEN $7 THEN $8 ELSE assignee_id END,
                position = CASE
                    WHEN $10::int IS NOT NULL THEN $10
                    WHEN $9::uuid IS NOT NULL AND $9 <> column_id THEN
                        COALESCE((SELECT MAX(o.position) + 1 FROM tasks o WHERE o.column_id = $9), 0)
                    ELSE position
                END,
                column_id = COALESCE($9, column_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        );

        let task = sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.priority)
            .bind(data.due_date.is_some())
            .bind(data.due_date.flatten())
            .bind(data.assignee_id.is_some())
            .bind(data.assignee_id.flatten())
            .bind(data.column_id)
            .bind(data.position)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(task) = task else {
            return Ok(None);
        };

        if let Some(reviewer_ids) = reviewer_ids {
            set_reviewers(&mut tx, task.id, &reviewer_ids).await?;
        }

        tx.commit().await?;

        tracing::info!(task_id = %task.id, column_id = %task.column_id, "Task updated");
        Ok(Some(task))
    }

    /// Deletes a task with its comments and reviewer rows
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!(task_id = %id, "Task deleted");
        }

        Ok(result.rows_affected() > 0)
    }

    /// Attaches status, people and comment counts to a batch of tasks
    ///
    /// Issues a fixed number of queries regardless of batch size and keeps
    /// the input order.
    pub async fn with_details(pool: &PgPool, tasks: Vec<Task>) -> Result<Vec<TaskDetails>, sqlx::Error> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let task_ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let column_ids: Vec<Uuid> = tasks.iter().map(|t| t.column_id).collect();

        let column_titles: HashMap<Uuid, String> =
            sqlx::query_as::<_, (Uuid, String)>("SELECT id, title FROM columns WHERE id = ANY($1)")
                .bind(&column_ids)
                .fetch_all(pool)
                .await?
                .into_iter()
                .collect();

        let reviewer_rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT task_id, user_id FROM task_reviewers WHERE task_id = ANY($1)",
        )
        .bind(&task_ids)
        .fetch_all(pool)
        .await?;

        let comment_counts: HashMap<Uuid, i64> = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT task_id, COUNT(*) FROM comments WHERE task_id = ANY($1) GROUP BY task_id",
        )
        .bind(&task_ids)
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

        let mut user_ids: Vec<Uuid> = tasks.iter().filter_map(|t| t.assignee_id).collect();
        user_ids.extend(reviewer_rows.iter().map(|(_, user_id)| *user_id));
        let user_ids = dedup_ids(&user_ids);

        let users: HashMap<Uuid, UserSummary> = User::find_many(pool, &user_ids)
            .await?
            .iter()
            .map(|u| (u.id, u.summary()))
            .collect();

        let mut reviewers: HashMap<Uuid, Vec<UserSummary>> = HashMap::new();
        for (task_id, user_id) in reviewer_rows {
            if let Some(summary) = users.get(&user_id) {
                reviewers.entry(task_id).or_default().push(summary.clone());
            }
        }
        for list in reviewers.values_mut() {
            list.sort_by(|a, b| a.email.cmp(&b.email));
        }

        Ok(tasks
            .into_iter()
            .map(|task| TaskDetails {
                status: column_titles
                    .get(&task.column_id)
                    .map(|title| ColumnStatus::from_title(title))
                    .unwrap_or(ColumnStatus::ToDo),
                assignee: task.assignee_id.and_then(|id| users.get(&id).cloned()),
                reviewers: reviewers.remove(&task.id).unwrap_or_default(),
                comments_count: comment_counts.get(&task.id).copied().unwrap_or(0),
                task,
            })
            .collect())
    }
}

/// Checks people named by a task write against the board's participants
///
/// The caller holds the board lock, so membership cannot change before the
/// write commits.
async fn ensure_participants(
    conn: &mut PgConnection,
    board_id: Uuid,
    assignee_id: Option<Uuid>,
    reviewer_ids: &[Uuid],
) -> Result<(), TaskWriteError> {
    if assignee_id.is_none() && reviewer_ids.is_empty() {
        return Ok(());
    }

    let participants = Board::participant_ids(conn, board_id).await?;
    check_participants(board_id, &participants, assignee_id, reviewer_ids)
}

/// Serializes position assignment within a column
async fn lock_column(conn: &mut PgConnection, column_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT id FROM columns WHERE id = $1 FOR NO KEY UPDATE")
        .bind(column_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Makes `user_ids` the exact reviewer set of a task
async fn set_reviewers(
    conn: &mut PgConnection,
    task_id: Uuid,
    user_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM task_reviewers WHERE task_id = $1 AND NOT (user_id = ANY($2))")
        .bind(task_id)
        .bind(user_ids)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO task_reviewers (task_id, user_id)
        SELECT $1, requested.id
        FROM UNNEST($2::uuid[]) AS requested(id)
        ON CONFLICT (task_id, user_id) DO NOTHING
        "#,
    )
    .bind(task_id)
    .bind(user_ids)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_defaults_to_medium() {
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn test_priority_wire_names() {
        assert_eq!(serde_json::to_string(&TaskPriority::High).unwrap(), "\"high\"");
        let parsed: TaskPriority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, TaskPriority::Low);
        assert!(serde_json::from_str::<TaskPriority>("\"urgent\"").is_err());
    }

    #[test]
    fn test_dedup_ids_keeps_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup_ids(&[a, b, a, b, a]), vec![a, b]);
        assert!(dedup_ids(&[]).is_empty());
    }

    #[test]
    fn test_check_participants_names_outsiders() {
        let board_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let participants = [owner, member];

        assert!(check_participants(board_id, &participants, Some(member), &[owner, member]).is_ok());
        assert!(check_participants(board_id, &participants, None, &[]).is_ok());

        match check_participants(board_id, &participants, Some(outsider), &[owner, outsider]) {
            Err(TaskWriteError::NotParticipants {
                assignee_id,
                reviewer_ids,
                ..
            }) => {
                assert_eq!(assignee_id, Some(outsider));
                assert_eq!(reviewer_ids, vec![outsider]);
            }
            other => panic!("expected NotParticipants, got {other:?}"),
        }

        match check_participants(board_id, &participants, Some(owner), &[outsider]) {
            Err(TaskWriteError::NotParticipants { assignee_id, .. }) => assert!(assignee_id.is_none()),
            other => panic!("expected NotParticipants, got {other:?}"),
        }
    }

    #[test]
    fn test_update_task_default_changes_nothing() {
        let update = UpdateTask::default();
        assert!(update.title.is_none());
        assert!(update.due_date.is_none());
        assert!(update.assignee_id.is_none());
        assert!(update.reviewer_ids.is_none());
        assert!(update.column_id.is_none());
    }

    #[test]
    fn test_task_details_flattens_task() {
        let task = Task {
            id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            column_id: Uuid::new_v4(),
            title: "Ship it".to_string(),
            description: String::new(),
            priority: TaskPriority::High,
            position: 0,
            due_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            assignee_id: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let details = TaskDetails {
            task,
            status: ColumnStatus::Review,
            assignee: None,
            reviewers: vec![],
            comments_count: 3,
        };

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["title"], "Ship it");
        assert_eq!(json["status"], "review");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["due_date"], "2026-03-01");
        assert_eq!(json["comments_count"], 3);
        assert!(json["assignee"].is_null());
    }
}
