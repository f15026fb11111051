use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopit::api::{auth::ensure_admin_user, metrics::init_metrics, rate_limit};
use shopit::config::Config;
use shopit::notifications::SmtpMailer;
use shopit::AppState;

#[derive(Parser, Debug)]
#[command(name = "shopit")]
#[command(author, version, about = "E-commerce REST backend", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "shopit.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Override the data directory
    #[arg(long, env = "SHOPIT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Token signing secret
    #[arg(long, env = "SHOPIT_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.server.data_dir = dir;
    }
    if let Some(secret) = cli.jwt_secret {
        config.auth.jwt_secret = secret;
    }

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ShopIt v{}", env!("CARGO_PKG_VERSION"));

    config.ensure_jwt_secret();

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;

    let db = shopit::db::init(&config.server.data_dir).await?;

    let mailer = SmtpMailer::new(config.email.clone());
    if !mailer.is_enabled() {
        tracing::warn!("SMTP is not configured; password recovery emails will fail");
    }

    let mut state = AppState::new(config.clone(), db.clone(), Arc::new(mailer))?;

    ensure_admin_user(&db, &state.passwords, &config.auth).await?;

    match init_metrics() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "Failed to initialize metrics"),
    }
    let state = Arc::new(state);

    if config.rate_limit.enabled {
        rate_limit::spawn_cleanup_task(
            state.rate_limiter.clone(),
            config.rate_limit.cleanup_interval,
        );
    }
    shopit::cleanup::spawn_cleanup_task(db.clone(), config.cleanup.clone());

    let api_router = shopit::api::create_router(state.clone());

    // Serve the single-page front end, falling back to index.html
    let static_dir = config.server.static_dir.clone();
    let index_file = static_dir.join("index.html");
    let serve_static = ServeDir::new(&static_dir).not_found_service(ServeFile::new(&index_file));

    let app = axum::Router::new()
        .merge(api_router)
        .fallback_service(serve_static);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
