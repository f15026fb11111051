pub mod api;
pub mod auth;
pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod notifications;

pub use db::DbPool;

use chrono::Duration;
use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::auth::{AuthError, PasswordHasher, TokenService};
use crate::notifications::Mailer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub passwords: PasswordHasher,
    pub tokens: TokenService,
    pub mailer: Arc<dyn Mailer>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(mut config: Config, db: DbPool, mailer: Arc<dyn Mailer>) -> Result<Self, AuthError> {
        config.ensure_jwt_secret();

        let passwords = PasswordHasher::from_config(&config.auth)?;
        let tokens = TokenService::new(
            &config.auth.jwt_secret,
            Duration::hours(config.auth.token_ttl_hours),
        );
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Ok(Self {
            config,
            db,
            passwords,
            tokens,
            mailer,
            rate_limiter,
            metrics_handle: None,
        })
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
