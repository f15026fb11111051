use thiserror::Error;

use crate::db::Role;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("Password reset token is invalid or has expired")]
    InvalidOrExpiredToken,

    #[error("A session is already active for this account. Log out first.")]
    SessionAlreadyActive,

    #[error("Role ({role}) is not allowed to access this resource: {resource}")]
    Forbidden { role: Role, resource: String },

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
