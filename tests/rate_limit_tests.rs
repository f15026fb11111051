mod common;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
};
use common::{spawn_app_configured, RecordingMailer, TestApp};
use std::net::SocketAddr;
use tower::ServiceExt;

async fn limited_app(trust_proxy_headers: bool) -> TestApp {
    spawn_app_configured(RecordingMailer::default(), |config| {
        config.rate_limit.enabled = true;
        config.rate_limit.auth_requests_per_window = 3;
        config.rate_limit.trust_proxy_headers = trust_proxy_headers;
    })
    .await
}

/// Failed login from `peer`, claiming to forward for `forwarded_for`
async fn login_attempt(app: &TestApp, peer: SocketAddr, forwarded_for: &str) -> StatusCode {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/v1/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::from(
            serde_json::json!({ "email": "nobody@example.com", "password": "wrong-pass" })
                .to_string(),
        ))
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));

    app.router.clone().oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_rotating_forwarded_for_does_not_reset_budget() {
    let app = limited_app(false).await;
    let peer: SocketAddr = "198.51.100.20:40000".parse().unwrap();

    let mut statuses = Vec::new();
    for i in 0..5 {
        statuses.push(login_attempt(&app, peer, &format!("203.0.113.{}", i)).await);
    }

    assert_eq!(&statuses[..3], &[StatusCode::UNAUTHORIZED; 3]);
    assert_eq!(&statuses[3..], &[StatusCode::TOO_MANY_REQUESTS; 2]);
}

#[tokio::test]
async fn test_trusted_proxy_keys_clients_by_forwarded_for() {
    let app = limited_app(true).await;
    let proxy: SocketAddr = "10.0.0.2:8080".parse().unwrap();

    for _ in 0..3 {
        assert_eq!(
            login_attempt(&app, proxy, "203.0.113.1").await,
            StatusCode::UNAUTHORIZED
        );
    }
    assert_eq!(
        login_attempt(&app, proxy, "203.0.113.1").await,
        StatusCode::TOO_MANY_REQUESTS
    );

    // A different client behind the same proxy has its own budget
    assert_eq!(
        login_attempt(&app, proxy, "203.0.113.2").await,
        StatusCode::UNAUTHORIZED
    );
}
