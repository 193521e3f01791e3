/// User model and database operations
///
/// Users register with an email and password. Everything else a user owns
/// (boards, tokens, comments) hangs off the user's id.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email CITEXT NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     first_name VARCHAR(150) NOT NULL DEFAULT '',
///     last_name VARCHAR(150) NOT NULL DEFAULT '',
///     is_guest BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use kanmind_shared::models::user::{CreateUser, User};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     email: "ada@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     first_name: "Ada".to_string(),
///     last_name: "Lovelace".to_string(),
///     is_guest: false,
/// }).await?;
///
/// assert_eq!(user.fullname(), "Ada Lovelace");
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email::text AS email, password_hash, first_name, last_name, is_guest, \
                            created_at, updated_at, last_login_at";

/// A registered account
///
/// The password hash never leaves the server: it is skipped on serialization.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Email address, unique case-insensitively
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Given name (may be empty)
    pub first_name: String,

    /// Family name (may be empty)
    pub last_name: String,

    /// Whether this is the shared demo account
    pub is_guest: bool,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the profile was last changed
    pub updated_at: DateTime<Utc>,

    /// When the user last logged in
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    /// Email address
    pub email: String,

    /// Argon2id hash of the password
    pub password_hash: String,

    /// Given name
    pub first_name: String,

    /// Family name
    pub last_name: String,

    /// Marks the demo account
    pub is_guest: bool,
}

/// Profile and credential changes
///
/// `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    /// New given name
    pub first_name: Option<String>,

    /// New family name
    pub last_name: Option<String>,

    /// New password hash
    pub password_hash: Option<String>,
}

/// Public view of a user embedded in board, task and comment payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// User ID
    pub id: Uuid,

    /// Email address
    pub email: String,

    /// Display name
    pub fullname: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            fullname: user.fullname(),
        }
    }
}

/// Builds a display name from its parts
///
/// Falls back to the local part of the email when both names are blank.
pub fn display_name(first_name: &str, last_name: &str, email: &str) -> String {
    let full = format!("{} {}", first_name.trim(), last_name.trim());
    let full = full.trim();

    if !full.is_empty() {
        return full.to_string();
    }

    email.split('@').next().unwrap_or(email).to_string()
}

impl User {
    /// Display name of this user
    pub fn fullname(&self) -> String {
        display_name(&self.first_name, &self.last_name, &self.email)
    }

    /// Public summary of this user
    pub fn summary(&self) -> UserSummary {
        UserSummary::from(self)
    }

    /// Inserts a new user
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on `users_email_key` when the email is
    /// already registered.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, is_guest)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(data.email)
            .bind(data.password_hash)
            .bind(data.first_name)
            .bind(data.last_name)
            .bind(data.is_guest)
            .fetch_one(pool)
            .await?;

        tracing::info!(user_id = %user.id, is_guest = user.is_guest, "User created");
        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email address
    ///
    /// The comparison is case-insensitive through the CITEXT column type.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1::citext");

        sqlx::query_as::<_, User>(&query)
            .bind(email.trim())
            .fetch_optional(pool)
            .await
    }

    /// Loads every user whose id is in `ids`
    ///
    /// Unknown ids are silently absent from the result; callers compare
    /// lengths when they need to detect them.
    pub async fn find_many(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1) ORDER BY email");

        sqlx::query_as::<_, User>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Returns the subset of `ids` that do not belong to any user
    pub async fn missing_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Uuid>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_scalar(
            r#"
            SELECT requested.id
            FROM UNNEST($1::uuid[]) AS requested(id)
            WHERE NOT EXISTS (SELECT 1 FROM users u WHERE u.id = requested.id)
            "#,
        )
        .bind(ids)
        .fetch_all(pool)
        .await
    }

    /// Applies profile or password changes
    ///
    /// Returns `None` when the user does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                password_hash = COALESCE($4, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(data.first_name)
            .bind(data.last_name)
            .bind(data.password_hash)
            .fetch_optional(pool)
            .await
    }

    /// Stamps `last_login_at` with the current time
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str, email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            is_guest: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_fullname_joins_names() {
        assert_eq!(user("Ada", "Lovelace", "ada@example.com").fullname(), "Ada Lovelace");
    }

    #[test]
    fn test_fullname_with_single_name() {
        assert_eq!(user("Ada", "", "ada@example.com").fullname(), "Ada");
        assert_eq!(user("", "Lovelace", "ada@example.com").fullname(), "Lovelace");
    }

    #[test]
    fn test_fullname_falls_back_to_email_local_part() {
        assert_eq!(user("", "  ", "grace.hopper@example.com").fullname(), "grace.hopper");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(user("Ada", "Lovelace", "ada@example.com")).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "ada@example.com");
    }

    #[test]
    fn test_summary_uses_display_name() {
        let u = user("Ada", "Lovelace", "ada@example.com");
        let summary = u.summary();
        assert_eq!(summary.id, u.id);
        assert_eq!(summary.fullname, "Ada Lovelace");
    }

    #[test]
    fn test_update_user_default_changes_nothing() {
        let update = UpdateUser::default();
        assert!(update.first_name.is_none());
        assert!(update.last_name.is_none());
        assert!(update.password_hash.is_none());
    }
}
