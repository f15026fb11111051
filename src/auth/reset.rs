//! Password reset tokens.
//!
//! The raw token only ever leaves the server in the reset email; the store
//! keeps its SHA-256 digest and an expiry.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;

use super::AuthError;
use crate::db::{format_timestamp, now_timestamp, DbPool, User};

#[derive(Debug, Clone)]
pub struct ResetToken {
    pub raw: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    pub fn generate(ttl: Duration) -> Self {
        let bytes: [u8; 32] = rand::rng().random();
        let raw = hex::encode(bytes);
        Self {
            hash: hash_token(&raw),
            raw,
            expires_at: Utc::now() + ttl,
        }
    }
}

/// SHA-256 hex digest of a raw token
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn store(pool: &DbPool, user_id: &str, token: &ResetToken) -> Result<(), AuthError> {
    sqlx::query(
        "UPDATE users SET reset_password_token = ?, reset_password_expire = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&token.hash)
    .bind(format_timestamp(token.expires_at))
    .bind(now_timestamp())
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear(pool: &DbPool, user_id: &str) -> Result<(), AuthError> {
    sqlx::query(
        "UPDATE users SET reset_password_token = NULL, reset_password_expire = NULL WHERE id = ?",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Redeem a raw token. Matching and clearing happen in one statement, so a
/// token can be redeemed at most once. On a transaction, a rollback leaves
/// the token redeemable.
pub async fn consume(
    conn: &mut SqliteConnection,
    raw: &str,
    now: DateTime<Utc>,
) -> Result<User, AuthError> {
    let now = format_timestamp(now);
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET reset_password_token = NULL, reset_password_expire = NULL, updated_at = ?
        WHERE reset_password_token = ? AND reset_password_expire > ?
        RETURNING *
        "#,
    )
    .bind(&now)
    .bind(hash_token(raw))
    .bind(&now)
    .fetch_optional(conn)
    .await?
    .ok_or(AuthError::InvalidOrExpiredToken)
}

/// Drop reset tokens whose expiry has passed
pub async fn clear_expired(pool: &DbPool, now: DateTime<Utc>) -> Result<u64, AuthError> {
    let result = sqlx::query(
        "UPDATE users SET reset_password_token = NULL, reset_password_expire = NULL WHERE reset_password_expire IS NOT NULL AND reset_password_expire <= ?",
    )
    .bind(format_timestamp(now))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
