/// Login token storage
///
/// Every successful login or registration issues a fresh opaque token. Only
/// its SHA-256 digest is stored, so a leaked table cannot be replayed.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE auth_tokens (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     token_hash VARCHAR(64) NOT NULL UNIQUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_used_at TIMESTAMPTZ,
///     expires_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use kanmind_shared::models::auth_token::AuthToken;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
/// let (record, token) = AuthToken::issue(&pool, user_id, Some(chrono::Duration::days(30))).await?;
///
/// let found = AuthToken::authenticate(&pool, &token).await?;
/// assert_eq!(found.map(|t| t.id), Some(record.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::token::{generate_token, hash_token};

/// A stored login token
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthToken {
    /// Token ID
    pub id: Uuid,

    /// Owner of the token
    pub user_id: Uuid,

    /// SHA-256 hex digest of the plaintext token
    #[serde(skip_serializing)]
    pub token_hash: String,

    /// When the token was issued
    pub created_at: DateTime<Utc>,

    /// When the token last authenticated a request
    pub last_used_at: Option<DateTime<Utc>>,

    /// When the token stops working (None = never)
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthToken {
    /// Returns true when the token is past its expiry
    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| at <= Utc::now())
    }

    /// Issues a new token for `user_id`
    ///
    /// Returns the stored record together with the plaintext token. The
    /// plaintext is not recoverable afterwards.
    pub async fn issue(
        pool: &PgPool,
        user_id: Uuid,
        ttl: Option<Duration>,
    ) -> Result<(Self, String), sqlx::Error> {
        let (token, token_hash) = generate_token();
        let expires_at = ttl.map(|ttl| Utc::now() + ttl);

        let record = sqlx::query_as::<_, AuthToken>(
            r#"
            INSERT INTO auth_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, created_at, last_used_at, expires_at
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(pool)
        .await?;

        tracing::debug!(user_id = %user_id, token_id = %record.id, "Auth token issued");
        Ok((record, token))
    }

    /// Resolves a plaintext token to its live record
    ///
    /// Expired tokens resolve to `None`. A match refreshes `last_used_at`.
    pub async fn authenticate(pool: &PgPool, token: &str) -> Result<Option<Self>, sqlx::Error> {
        let record = sqlx::query_as::<_, AuthToken>(
            r#"
            UPDATE auth_tokens
            SET last_used_at = NOW()
            WHERE token_hash = $1
              AND (expires_at IS NULL OR expires_at > NOW())
            RETURNING id, user_id, token_hash, created_at, last_used_at, expires_at
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Deletes a single token
    pub async fn revoke(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every token of `user_id` except `keep`
    ///
    /// Returns the number of revoked tokens.
    pub async fn revoke_others(pool: &PgPool, user_id: Uuid, keep: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = $1 AND id <> $2")
            .bind(user_id)
            .bind(keep)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Deletes the expired tokens of `user_id`
    pub async fn purge_expired(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM auth_tokens WHERE user_id = $1 AND expires_at IS NOT NULL AND expires_at <= NOW()",
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::debug!(user_id = %user_id, purged = result.rows_affected(), "Expired tokens purged");
        }

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: Option<DateTime<Utc>>) -> AuthToken {
        AuthToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "0".repeat(64),
            created_at: Utc::now(),
            last_used_at: None,
            expires_at,
        }
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        assert!(!token(None).is_expired());
    }

    #[test]
    fn test_token_expiry() {
        assert!(token(Some(Utc::now() - Duration::seconds(1))).is_expired());
        assert!(!token(Some(Utc::now() + Duration::hours(1))).is_expired());
    }

    #[test]
    fn test_token_hash_not_serialized() {
        let json = serde_json::to_value(token(None)).unwrap();
        assert!(json.get("token_hash").is_none());
    }
}
