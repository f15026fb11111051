//! Account endpoints, authentication middleware and the admin gate.
//!
//! Tokens travel in the `token` cookie or an `Authorization: Bearer` header.
//! A token is honoured only while the session it names is still active.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, OriginalUri, Path, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use sqlx::SqliteConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{authorize, reset, session, AuthError, PasswordHasher, ResetToken};
use crate::config::AuthConfig;
use crate::db::{
    now_timestamp, DbPool, ForgotPasswordRequest, Image, LoginRequest, LoginResponse,
    RegisterRequest, ResetPasswordRequest, Role, UpdatePasswordRequest, UpdateProfileRequest,
    User, UserResponse,
};
use crate::notifications::OutgoingEmail;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::metrics::{record_auth_event, AuthEvent};
use super::response::ApiResponse;
use super::validation::{validate_email, validate_image, validate_name, validate_password};

pub const TOKEN_COOKIE: &str = "token";

/// The authenticated principal and the session their token belongs to
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session_id: String,
}

/// Principal if the request carries a valid token, otherwise anonymous
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn is_admin(&self) -> bool {
        self.0
            .as_ref()
            .is_some_and(|c| c.user.role_enum() == Role::Admin)
    }
}

/// Fields for a new account row
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub avatar: Option<&'a Image>,
}

pub async fn insert_user(
    conn: &mut SqliteConnection,
    new: NewUser<'_>,
) -> Result<User, sqlx::Error> {
    let now = now_timestamp();
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, avatar_public_id, avatar_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(new.name.trim())
    .bind(new.email.trim())
    .bind(new.password_hash)
    .bind(new.role.as_str())
    .bind(new.avatar.map(|a| a.public_id.as_str()))
    .bind(new.avatar.map(|a| a.url.as_str()))
    .bind(&now)
    .bind(&now)
    .fetch_one(conn)
    .await
}

/// Map a unique-email violation to a readable conflict
pub(crate) fn email_taken(err: sqlx::Error) -> ApiError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::conflict("Email is already registered")
        }
        _ => ApiError::from(err),
    }
}

/// Create the configured bootstrap administrator if it does not exist yet
pub async fn ensure_admin_user(
    db: &DbPool,
    passwords: &PasswordHasher,
    config: &AuthConfig,
) -> anyhow::Result<()> {
    let (email, password) = match (&config.admin_email, &config.admin_password) {
        (Some(email), Some(password)) => (email, password),
        _ => {
            tracing::debug!("No bootstrap admin configured");
            return Ok(());
        }
    };

    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?;

    if let Some(user) = existing {
        if user.role_enum() != Role::Admin {
            tracing::warn!(email = %email, "Bootstrap admin email belongs to a non-admin account");
        }
        return Ok(());
    }

    let password_hash = passwords.hash(password)?;
    let mut conn = db.acquire().await?;
    insert_user(
        &mut conn,
        NewUser {
            name: &config.admin_name,
            email,
            password_hash: &password_hash,
            role: Role::Admin,
            avatar: None,
        },
    )
    .await?;

    tracing::info!(email = %email, "Created bootstrap admin user");
    Ok(())
}

// -------------------------------------------------------------------------
// Token transport
// -------------------------------------------------------------------------

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    CookieJar::from_headers(headers)
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

fn token_cookie(token: String, days: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(days))
        .build()
}

fn clear_token_cookie(jar: CookieJar, secure: bool) -> CookieJar {
    jar.remove(Cookie::build((TOKEN_COOKIE, "")).path("/").secure(secure))
}

/// Resolve the request's token to a live session and its user
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser, AuthError> {
    let token = extract_token(headers).ok_or(AuthError::InvalidToken)?;
    let claims = state.tokens.verify(&token)?;

    if !session::is_active(&state.db, &claims.sid, Utc::now()).await? {
        return Err(AuthError::InvalidToken);
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    Ok(CurrentUser {
        user,
        session_id: claims.sid,
    })
}

/// Rejects requests without a live session; downstream handlers read `CurrentUser`
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let current = authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(current);
    Ok(next.run(request).await)
}

/// Admin-only routes; runs after `auth_middleware`
pub async fn require_admin(
    OriginalUri(uri): OriginalUri,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let current = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or(AuthError::InvalidToken)?;

    if let Err(e) = authorize(&current.user, &[Role::Admin], uri.path()) {
        tracing::warn!(user_id = %current.user.id, path = %uri.path(), "Role check failed");
        return Err(e.into());
    }

    Ok(next.run(request).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AuthError::InvalidToken.into())
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match authenticate(state, &parts.headers).await {
            Ok(current) => Ok(MaybeUser(Some(current))),
            Err(AuthError::Database(e)) => Err(e.into()),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}

// -------------------------------------------------------------------------
// Session issuance
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStart {
    /// Refuse if a live session exists
    Exclusive,
    /// Revoke every existing session first
    Replace,
}

/// Record a session on `conn` and sign its token. Nothing is kept unless
/// the caller commits.
async fn start_session(
    state: &AppState,
    conn: &mut SqliteConnection,
    user_id: &str,
    start: SessionStart,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let expires_at = state.tokens.expiry_from(now);

    let session = match start {
        SessionStart::Exclusive => session::begin(conn, user_id, now, expires_at).await?,
        SessionStart::Replace => session::rotate(conn, user_id, now, expires_at).await?,
    };

    Ok(state.tokens.issue(user_id, &session.id, now, expires_at)?)
}

fn signed_in(
    state: &AppState,
    jar: CookieJar,
    token: String,
    user: User,
) -> (CookieJar, LoginResponse) {
    let jar = jar.add(token_cookie(
        token.clone(),
        state.config.auth.cookie_expires_days,
        state.config.server.cookies_secure(),
    ));
    let response = LoginResponse {
        token,
        user: UserResponse::from(user),
    };
    (jar, response)
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

/// POST /api/v1/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_name(&req.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    if let Some(ref avatar) = req.avatar {
        if let Err(e) = validate_image(avatar) {
            errors.add("avatar", e);
        }
    }
    errors.finish()?;

    let password_hash = state.passwords.hash(&req.password)?;

    let mut tx = state.db.begin().await?;
    let user = insert_user(
        &mut tx,
        NewUser {
            name: &req.name,
            email: &req.email,
            password_hash: &password_hash,
            role: Role::User,
            avatar: req.avatar.as_ref(),
        },
    )
    .await
    .map_err(email_taken)?;
    let token = start_session(&state, &mut tx, &user.id, SessionStart::Exclusive).await?;
    tx.commit().await?;

    record_auth_event(AuthEvent::Register);
    tracing::info!(user_id = %user.id, "User registered");

    let (jar, body) = signed_in(&state, jar, token, user);
    Ok((jar, ApiResponse::created(body)))
}

/// POST /api/v1/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Please enter email & password"));
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(req.email.trim())
        .fetch_optional(&state.db)
        .await?;

    let user = match user {
        Some(user) if state.passwords.verify(&req.password, &user.password_hash) => user,
        _ => {
            record_auth_event(AuthEvent::LoginFailed);
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let mut tx = state.db.begin().await?;
    let token = match start_session(&state, &mut tx, &user.id, SessionStart::Exclusive).await {
        Ok(token) => token,
        Err(e) => {
            record_auth_event(AuthEvent::LoginRefused);
            return Err(e);
        }
    };
    tx.commit().await?;

    record_auth_event(AuthEvent::Login);
    tracing::info!(user_id = %user.id, "User logged in");

    let (jar, body) = signed_in(&state, jar, token, user);
    Ok((jar, ApiResponse::ok(body)))
}

/// GET /api/v1/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<()>), ApiError> {
    session::end(&state.db, &current.session_id).await?;

    record_auth_event(AuthEvent::Logout);
    tracing::info!(user_id = %current.user.id, "User logged out");

    let jar = clear_token_cookie(jar, state.config.server.cookies_secure());
    Ok((jar, ApiResponse::message("Logged out")))
}

/// POST /api/v1/password/forgot
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    if let Err(e) = validate_email(&req.email) {
        return Err(ApiError::validation_field("email", e));
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(req.email.trim())
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found with this email"))?;

    let ttl_minutes = state.config.auth.reset_token_ttl_minutes;
    let token = ResetToken::generate(Duration::minutes(ttl_minutes));
    reset::store(&state.db, &user.id, &token).await?;

    let reset_url = format!(
        "{}/api/v1/password/reset/{}",
        state.config.server.public_url.trim_end_matches('/'),
        token.raw
    );
    let email = OutgoingEmail::password_reset(&user.email, &reset_url, ttl_minutes);

    if let Err(e) = state.mailer.send(email).await {
        tracing::error!(user_id = %user.id, error = %e, "Failed to send password recovery email");
        reset::clear(&state.db, &user.id).await?;
        return Err(ApiError::upstream("Failed to send the password recovery email"));
    }

    record_auth_event(AuthEvent::ResetRequested);
    Ok(ApiResponse::message(format!("Email sent to: {}", user.email)))
}

/// PUT /api/v1/password/reset/:token
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(raw_token): Path<String>,
    jar: CookieJar,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    if req.password != req.confirm_password {
        errors.add("confirmPassword", "Password does not match");
    }
    errors.finish()?;

    let password_hash = state.passwords.hash(&req.password)?;

    // A failure after redeeming rolls back and leaves the token usable
    let mut tx = state.db.begin().await?;
    let user = reset::consume(&mut tx, &raw_token, Utc::now()).await?;
    let user = set_password(&mut tx, &user.id, &password_hash).await?;
    let token = start_session(&state, &mut tx, &user.id, SessionStart::Replace).await?;
    tx.commit().await?;

    record_auth_event(AuthEvent::PasswordReset);
    tracing::info!(user_id = %user.id, "Password reset");

    let (jar, body) = signed_in(&state, jar, token, user);
    Ok((jar, ApiResponse::ok(body)))
}

async fn set_password(
    conn: &mut SqliteConnection,
    user_id: &str,
    password_hash: &str,
) -> Result<User, ApiError> {
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(password_hash)
    .bind(now_timestamp())
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(user)
}

/// GET /api/v1/me
pub async fn me(current: CurrentUser) -> ApiResponse<UserResponse> {
    ApiResponse::ok(UserResponse::from(current.user))
}

/// PUT /api/v1/password/update
pub async fn update_password(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    jar: CookieJar,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    if !state
        .passwords
        .verify(&req.old_password, &current.user.password_hash)
    {
        return Err(ApiError::validation_field("oldPassword", "Old password is incorrect"));
    }
    if let Err(e) = validate_password(&req.password) {
        return Err(ApiError::validation_field("password", e));
    }

    let password_hash = state.passwords.hash(&req.password)?;

    let mut tx = state.db.begin().await?;
    let user = set_password(&mut tx, &current.user.id, &password_hash).await?;
    let token = start_session(&state, &mut tx, &user.id, SessionStart::Replace).await?;
    tx.commit().await?;

    record_auth_event(AuthEvent::PasswordUpdated);
    tracing::info!(user_id = %user.id, "Password updated");

    let (jar, body) = signed_in(&state, jar, token, user);
    Ok((jar, ApiResponse::ok(body)))
}

/// PUT /api/v1/me/update
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
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
    if let Some(ref avatar) = req.avatar {
        if let Err(e) = validate_image(avatar) {
            errors.add("avatar", e);
        }
    }
    errors.finish()?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            name = COALESCE(?, name),
            email = COALESCE(?, email),
            avatar_public_id = COALESCE(?, avatar_public_id),
            avatar_url = COALESCE(?, avatar_url),
            updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.email.as_deref().map(str::trim))
    .bind(req.avatar.as_ref().map(|a| a.public_id.as_str()))
    .bind(req.avatar.as_ref().map(|a| a.url.as_str()))
    .bind(now_timestamp())
    .bind(&current.user.id)
    .fetch_one(&state.db)
    .await
    .map_err(email_taken)?;

    Ok(ApiResponse::ok(UserResponse::from(user)))
}
