use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory holding the built single-page front end
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Externally visible base URL, used to build links in emails
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Allowed CORS origins (empty disables the CORS layer)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Mark the session cookie `Secure`. Unset follows the `public_url` scheme.
    #[serde(default)]
    pub secure_cookies: Option<bool>,
}

impl ServerConfig {
    pub fn cookies_secure(&self) -> bool {
        self.secure_cookies
            .unwrap_or_else(|| self.public_url.starts_with("https://"))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            static_dir: default_static_dir(),
            public_url: default_public_url(),
            cors_origins: Vec::new(),
            secure_cookies: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("frontend/build")
}

fn default_public_url() -> String {
    "http://localhost:4000".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for session tokens. Generated at startup when empty.
    #[serde(default)]
    pub jwt_secret: String,
    /// Lifetime of an issued session token, in hours
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    /// Lifetime of the `token` cookie, in days
    #[serde(default = "default_cookie_expires_days")]
    pub cookie_expires_days: i64,
    /// Lifetime of a password reset token, in minutes
    #[serde(default = "default_reset_token_ttl_minutes")]
    pub reset_token_ttl_minutes: i64,
    /// Argon2 memory cost in KiB
    #[serde(default = "default_hash_memory_kib")]
    pub hash_memory_kib: u32,
    /// Argon2 iteration count (the work factor)
    #[serde(default = "default_hash_iterations")]
    pub hash_iterations: u32,
    /// Bootstrap admin account, created at startup when both are set
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
            cookie_expires_days: default_cookie_expires_days(),
            reset_token_ttl_minutes: default_reset_token_ttl_minutes(),
            hash_memory_kib: default_hash_memory_kib(),
            hash_iterations: default_hash_iterations(),
            admin_email: None,
            admin_password: None,
            admin_name: default_admin_name(),
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    24 * 7
}

fn default_cookie_expires_days() -> i64 {
    7
}

fn default_reset_token_ttl_minutes() -> i64 {
    30
}

fn default_hash_memory_kib() -> u32 {
    19 * 1024
}

fn default_hash_iterations() -> u32 {
    2
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

/// SMTP settings for outgoing mail (password recovery)
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    /// Host and sender are the minimum needed to send anything
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: default_smtp_tls(),
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "ShopIt".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Products per page on the listing endpoint
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
        }
    }
}

fn default_per_page() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests per window for general API routes
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    /// Requests per window for login, registration and password recovery
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Seconds between sweeps of stale limiter entries
    #[serde(default = "default_limiter_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Key clients by `X-Forwarded-For` / `X-Real-IP`. Enable only behind a
    /// reverse proxy that overwrites these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            api_requests_per_window: default_api_requests(),
            auth_requests_per_window: default_auth_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_limiter_cleanup_interval(),
            trust_proxy_headers: false,
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_api_requests() -> u32 {
    300
}

fn default_auth_requests() -> u32 {
    20
}

fn default_window_seconds() -> u64 {
    60
}

fn default_limiter_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
    /// Inactive or expired sessions older than this are deleted
    #[serde(default = "default_session_retention_days")]
    pub session_retention_days: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_cleanup_enabled(),
            interval_secs: default_cleanup_interval_secs(),
            session_retention_days: default_session_retention_days(),
        }
    }
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_session_retention_days() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        Ok(config)
    }

    /// Fill in a signing secret when none was configured.
    ///
    /// Tokens signed with a generated secret stop verifying after a restart.
    pub fn ensure_jwt_secret(&mut self) {
        if self.auth.jwt_secret.trim().is_empty() {
            warn!("No JWT secret configured; generating an ephemeral one");
            self.auth.jwt_secret = format!(
                "{}{}",
                uuid::Uuid::new_v4().simple(),
                uuid::Uuid::new_v4().simple()
            );
        }
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            email: EmailConfig::default(),
            catalog: CatalogConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cleanup: CleanupConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.auth.reset_token_ttl_minutes, 30);
        assert_eq!(config.catalog.per_page, 4);
        assert!(!config.email.is_configured());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
            [auth]
            jwt_secret = "s3cret"
            cookie_expires_days = 3

            [email]
            smtp_host = "smtp.example.com"
            from_address = "noreply@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.cookie_expires_days, 3);
        assert_eq!(config.auth.token_ttl_hours, 24 * 7);
        assert!(config.email.is_configured());
        assert_eq!(config.email.smtp_port, 587);
    }

    #[test]
    fn test_secure_cookies_follow_public_url() {
        let mut server = ServerConfig::default();
        assert!(!server.cookies_secure());

        server.public_url = "https://shop.example.com".to_string();
        assert!(server.cookies_secure());

        server.secure_cookies = Some(false);
        assert!(!server.cookies_secure());
    }

    #[test]
    fn test_proxy_headers_untrusted_by_default() {
        let config = Config::from_toml("[rate_limit]\nenabled = true").unwrap();
        assert!(!config.rate_limit.trust_proxy_headers);

        let config = Config::from_toml("[rate_limit]\ntrust_proxy_headers = true").unwrap();
        assert!(config.rate_limit.trust_proxy_headers);
    }

    #[test]
    fn test_ensure_jwt_secret_generates_once() {
        let mut config = Config::default();
        config.ensure_jwt_secret();
        let generated = config.auth.jwt_secret.clone();
        assert_eq!(generated.len(), 64);

        config.ensure_jwt_secret();
        assert_eq!(config.auth.jwt_secret, generated);
    }
}
