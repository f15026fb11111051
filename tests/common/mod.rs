#![allow(dead_code)]

use anyhow::bail;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

use shopit::config::Config;
use shopit::notifications::{Mailer, OutgoingEmail};
use shopit::AppState;

pub const ADMIN_EMAIL: &str = "admin@shopit.test";
pub const ADMIN_PASSWORD: &str = "admin-secret";

/// Captures outgoing mail instead of talking to an SMTP relay
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn last(&self) -> Option<OutgoingEmail> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        if self.fail {
            bail!("relay unavailable");
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub mailer: Arc<RecordingMailer>,
    _data_dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(RecordingMailer::default()).await
}

pub async fn spawn_app_with(mailer: RecordingMailer) -> TestApp {
    spawn_app_configured(mailer, |_| {}).await
}

/// Like `spawn_app_with`, with a hook to adjust the config before startup
pub async fn spawn_app_configured(
    mailer: RecordingMailer,
    configure: impl FnOnce(&mut Config),
) -> TestApp {
    let data_dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.server.data_dir = data_dir.path().to_path_buf();
    config.server.public_url = "http://shop.test".to_string();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.auth.hash_memory_kib = 1024;
    config.auth.hash_iterations = 1;
    config.auth.admin_email = Some(ADMIN_EMAIL.to_string());
    config.auth.admin_password = Some(ADMIN_PASSWORD.to_string());
    config.catalog.per_page = 2;
    config.rate_limit.enabled = false;
    config.cleanup.enabled = false;
    configure(&mut config);

    let db = shopit::db::init(data_dir.path()).await.unwrap();
    let mailer = Arc::new(mailer);
    let state = AppState::new(config.clone(), db.clone(), mailer.clone()).unwrap();
    shopit::api::auth::ensure_admin_user(&db, &state.passwords, &config.auth)
        .await
        .unwrap();

    let state = Arc::new(state);
    let router = shopit::api::create_router(state.clone());

    TestApp {
        router,
        state,
        mailer,
        _data_dir: data_dir,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/api/v1/register",
                None,
                Some(serde_json::json!({ "name": name, "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        token_of(&body)
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.request(
            "POST",
            "/api/v1/login",
            None,
            Some(serde_json::json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "admin login failed: {}", body);
        token_of(&body)
    }

    pub async fn create_product(&self, token: &str, product: Value) -> Value {
        let (status, body) = self
            .request("POST", "/api/v1/admin/product/new", Some(token), Some(product))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create product failed: {}", body);
        body["data"].clone()
    }
}

pub fn token_of(body: &Value) -> String {
    body["data"]["token"].as_str().unwrap().to_string()
}

/// Pull the raw reset token out of a recovery email
pub fn reset_token_from(email: &OutgoingEmail) -> String {
    let marker = "/api/v1/password/reset/";
    let start = email.text_body.find(marker).unwrap() + marker.len();
    email.text_body[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect()
}

pub fn product(name: &str, price: f64, category: &str) -> Value {
    serde_json::json!({
        "name": name,
        "price": price,
        "description": format!("{} description", name),
        "category": category,
        "seller": "Acme",
        "stock": 10,
        "images": [{ "public_id": "products/1", "url": "https://cdn.shop.test/1.png" }]
    })
}
