//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! Exposes:
//! - `http_requests_total` / `http_request_duration_seconds` per route
//! - `auth_events_total` by event (login, logout, register, password reset...)
//! - `users_total` and `products_total` gauges, refreshed on scrape

use anyhow::Result;
use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const AUTH_EVENTS_TOTAL: &str = "auth_events_total";
pub const USERS_TOTAL: &str = "users_total";
pub const PRODUCTS_TOTAL: &str = "products_total";

/// Account lifecycle events counted under `auth_events_total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    Register,
    Login,
    LoginFailed,
    LoginRefused,
    Logout,
    ResetRequested,
    PasswordReset,
    PasswordUpdated,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::Register => "register",
            AuthEvent::Login => "login",
            AuthEvent::LoginFailed => "login_failed",
            AuthEvent::LoginRefused => "login_refused",
            AuthEvent::Logout => "logout",
            AuthEvent::ResetRequested => "reset_requested",
            AuthEvent::PasswordReset => "password_reset",
            AuthEvent::PasswordUpdated => "password_updated",
        }
    }
}

/// Install the Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(AUTH_EVENTS_TOTAL, "Account events by kind");
    describe_gauge!(USERS_TOTAL, "Number of registered accounts");
    describe_gauge!(PRODUCTS_TOTAL, "Number of catalog products, by deletion state");

    Ok(handle)
}

/// GET /metrics - Prometheus text format, no authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await
    {
        gauge!(USERS_TOTAL).set(count as f64);
    }

    if let Ok(rows) = sqlx::query_as::<_, (bool, i64)>(
        "SELECT is_deleted, COUNT(*) FROM products GROUP BY is_deleted",
    )
    .fetch_all(&state.db)
    .await
    {
        let (mut live, mut deleted) = (0i64, 0i64);
        for (is_deleted, count) in rows {
            if is_deleted {
                deleted = count;
            } else {
                live = count;
            }
        }
        gauge!(PRODUCTS_TOTAL, "state" => "live").set(live as f64);
        gauge!(PRODUCTS_TOTAL, "state" => "deleted").set(deleted as f64);
    }
}

/// Middleware to track HTTP request metrics, labelled by matched route.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_auth_event(event: AuthEvent) {
    counter!(AUTH_EVENTS_TOTAL, "event" => event.as_str()).increment(1);
}
