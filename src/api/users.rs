use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::auth::session;
use crate::db::{now_timestamp, AdminUpdateUserRequest, Role, User, UserResponse};
use crate::AppState;

use super::auth::{email_taken, CurrentUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{require_uuid, validate_email, validate_name};

fn user_not_found(id: &str) -> ApiError {
    ApiError::not_found(format!("User does not exist with id: {}", id))
}

/// GET /api/v1/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<Vec<UserResponse>>, ApiError> {
    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC, rowid DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(ApiResponse::ok(
        users.into_iter().map(UserResponse::from).collect(),
    ))
}

/// GET /api/v1/admin/user/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
    require_uuid(&id)?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| user_not_found(&id))?;

    Ok(ApiResponse::ok(UserResponse::from(user)))
}

/// PUT /api/v1/admin/user/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
    require_uuid(&id)?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = req.name {
        if let Err(e) = validate_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(ref email) = req.email {
        if let Err(e) = validate_email(email) {
            errors.add("email", e);
        }
    }
    let role = match req.role.as_deref().map(str::parse::<Role>) {
        Some(Ok(role)) => Some(role),
        Some(Err(e)) => {
            errors.add("role", e);
            None
        }
        None => None,
    };
    errors.finish()?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            name = COALESCE(?, name),
            email = COALESCE(?, email),
            role = COALESCE(?, role),
            updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.email.as_deref().map(str::trim))
    .bind(role.map(|r| r.as_str()))
    .bind(now_timestamp())
    .bind(&id)
    .fetch_optional(&state.db)
    .await
    .map_err(email_taken)?
    .ok_or_else(|| user_not_found(&id))?;

    if let Some(role) = role {
        tracing::info!(user_id = %user.id, role = %role, "User role changed");
    }

    Ok(ApiResponse::ok(UserResponse::from(user)))
}

/// DELETE /api/v1/admin/user/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    require_uuid(&id)?;

    if current.user.id == id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(user_not_found(&id));
    }

    let revoked = session::purge(&state.db, &id).await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %id, revoked_sessions = revoked, "User deleted");
    Ok(ApiResponse::message("User deleted"))
}
