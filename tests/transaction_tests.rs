mod common;

use axum::http::StatusCode;
use common::{reset_token_from, spawn_app, TestApp};
use serde_json::json;

const REJECT_SESSIONS: &str = "CREATE TRIGGER reject_sessions BEFORE INSERT ON sessions \
     BEGIN SELECT RAISE(ABORT, 'sessions unavailable'); END";
const REJECT_PASSWORD_CHANGE: &str = "CREATE TRIGGER reject_password_change \
     BEFORE UPDATE OF password_hash ON users \
     BEGIN SELECT RAISE(ABORT, 'password store unavailable'); END";

async fn exec(app: &TestApp, sql: &str) {
    sqlx::query(sql).execute(&app.state.db).await.unwrap();
}

async fn request_reset(app: &TestApp, email: &str) -> String {
    let (status, _) = app
        .request(
            "POST",
            "/api/v1/password/forgot",
            None,
            Some(json!({ "email": email })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    reset_token_from(&app.mailer.last().expect("recovery email"))
}

#[tokio::test]
async fn test_failed_password_write_keeps_reset_token() {
    let app = spawn_app().await;
    let old_token = app.register("Jane", "jane@shop.test", "secret1").await;
    let reset = request_reset(&app, "jane@shop.test").await;
    let uri = format!("/api/v1/password/reset/{}", reset);
    let body = json!({ "password": "newsecret", "confirmPassword": "newsecret" });

    exec(&app, REJECT_PASSWORD_CHANGE).await;
    let (status, _) = app.request("PUT", &uri, None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // Nothing changed: the old session and password still stand
    let (status, _) = app.request("GET", "/api/v1/me", Some(&old_token), None).await;
    assert_eq!(status, StatusCode::OK);

    exec(&app, "DROP TRIGGER reject_password_change").await;
    let (status, _) = app.request("PUT", &uri, None, Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.request("GET", "/api/v1/me", Some(&old_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_failed_session_rotation_rolls_back_reset() {
    let app = spawn_app().await;
    app.register("Jane", "jane@shop.test", "secret1").await;
    let reset = request_reset(&app, "jane@shop.test").await;
    let uri = format!("/api/v1/password/reset/{}", reset);
    let body = json!({ "password": "newsecret", "confirmPassword": "newsecret" });

    exec(&app, REJECT_SESSIONS).await;
    let (status, _) = app.request("PUT", &uri, None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // The new password was not kept
    let (status, _) = app.login("jane@shop.test", "newsecret").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    exec(&app, "DROP TRIGGER reject_sessions").await;
    let (status, _) = app.request("PUT", &uri, None, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_failed_session_rolls_back_registration() {
    let app = spawn_app().await;
    exec(&app, REJECT_SESSIONS).await;

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/register",
            None,
            Some(json!({ "name": "Jane", "email": "jane@shop.test", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind("jane@shop.test")
        .fetch_one(&app.state.db)
        .await
        .unwrap();
    assert_eq!(count, 0);

    exec(&app, "DROP TRIGGER reject_sessions").await;
    app.register("Jane", "jane@shop.test", "secret1").await;
}

#[tokio::test]
async fn test_failed_session_keeps_old_password() {
    let app = spawn_app().await;
    let token = app.register("Jane", "jane@shop.test", "secret1").await;

    exec(&app, REJECT_SESSIONS).await;
    let (status, _) = app
        .request(
            "PUT",
            "/api/v1/password/update",
            Some(&token),
            Some(json!({ "oldPassword": "secret1", "password": "newsecret" })),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    exec(&app, "DROP TRIGGER reject_sessions").await;

    let (status, _) = app.request("GET", "/api/v1/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.login("jane@shop.test", "newsecret").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
