//! Single-active-session guard.
//!
//! A user holds at most one active session. The partial unique index
//! `idx_sessions_one_active` is the final arbiter when logins race.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::AuthError;
use crate::db::{format_timestamp, DbPool, Session};

/// Start a session for `user_id`, refusing if a live one already exists.
///
/// Expired or deactivated sessions never block a login; they are removed here.
/// Run this on a transaction; the caller commits once its own writes succeed.
pub async fn begin(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Session, AuthError> {
    let now_str = format_timestamp(now);

    // Writing first takes the store's write lock for the rest of the transaction
    sqlx::query("DELETE FROM sessions WHERE user_id = ? AND (is_active = 0 OR expires_at <= ?)")
        .bind(user_id)
        .bind(&now_str)
        .execute(&mut *conn)
        .await?;

    let live: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM sessions WHERE user_id = ? AND is_active = 1 AND expires_at > ?",
    )
    .bind(user_id)
    .bind(&now_str)
    .fetch_optional(&mut *conn)
    .await?;

    if live.is_some() {
        tracing::info!(user_id = %user_id, "Login refused, session already active");
        return Err(AuthError::SessionAlreadyActive);
    }

    let session = insert(conn, user_id, &now_str, expires_at).await?;

    tracing::debug!(user_id = %user_id, session_id = %session.id, "Session started");
    Ok(session)
}

/// Revoke every session of `user_id` and start a fresh one. Run this on a
/// transaction.
pub async fn rotate(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Session, AuthError> {
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let session = insert(conn, user_id, &format_timestamp(now), expires_at).await?;

    tracing::debug!(user_id = %user_id, session_id = %session.id, "Sessions rotated");
    Ok(session)
}

async fn insert(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: &str,
    expires_at: DateTime<Utc>,
) -> Result<Session, AuthError> {
    sqlx::query_as::<_, Session>(
        "INSERT INTO sessions (id, user_id, is_active, created_at, expires_at) VALUES (?, ?, 1, ?, ?) RETURNING *",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(now)
    .bind(format_timestamp(expires_at))
    .fetch_one(conn)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::SessionAlreadyActive,
        _ => AuthError::Database(e),
    })
}

/// Deactivate a session. Returns false if it was not active.
pub async fn end(pool: &DbPool, session_id: &str) -> Result<bool, AuthError> {
    let result = sqlx::query("UPDATE sessions SET is_active = 0 WHERE id = ? AND is_active = 1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Whether the session is active and its token has not expired
pub async fn is_active(
    pool: &DbPool,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, AuthError> {
    let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

    Ok(session.is_some_and(|s| s.is_live(&format_timestamp(now))))
}

/// Remove all sessions of a user
pub async fn purge(pool: &DbPool, user_id: &str) -> Result<u64, AuthError> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Remove inactive or expired sessions created before `cutoff`
pub async fn purge_stale(
    pool: &DbPool,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> Result<u64, AuthError> {
    let result = sqlx::query(
        "DELETE FROM sessions WHERE (is_active = 0 OR expires_at <= ?) AND created_at < ?",
    )
    .bind(format_timestamp(now))
    .bind(format_timestamp(cutoff))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
