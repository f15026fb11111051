//! Background housekeeping for the auth tables.
//!
//! Periodically removes dead sessions past the retention window and clears
//! password reset tokens whose expiry has passed.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{interval, Duration};

use crate::auth::{reset, session};
use crate::config::CleanupConfig;
use crate::DbPool;

pub struct SessionCleanup {
    db: DbPool,
    config: CleanupConfig,
}

impl SessionCleanup {
    pub fn new(db: DbPool, config: CleanupConfig) -> Self {
        Self { db, config }
    }

    /// Run a single cleanup cycle
    pub async fn run_cleanup(&self) -> Result<CleanupStats> {
        let mut stats = CleanupStats::default();

        if !self.config.enabled {
            tracing::debug!("Cleanup is disabled, skipping");
            return Ok(stats);
        }

        let now = Utc::now();
        let cutoff = now - ChronoDuration::days(self.config.session_retention_days.max(0));

        stats.sessions_removed = session::purge_stale(&self.db, now, cutoff).await?;
        stats.reset_tokens_cleared = reset::clear_expired(&self.db, now).await?;

        tracing::info!(
            sessions = stats.sessions_removed,
            reset_tokens = stats.reset_tokens_cleared,
            "Cleanup cycle completed"
        );

        Ok(stats)
    }
}

/// Statistics from a cleanup run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub sessions_removed: u64,
    pub reset_tokens_cleared: u64,
}

/// Spawn the background cleanup task
pub fn spawn_cleanup_task(db: DbPool, config: CleanupConfig) {
    if !config.enabled {
        tracing::info!("Session cleanup is disabled");
        return;
    }

    let interval_secs = config.interval_secs.max(1);
    tracing::info!(
        interval_secs = interval_secs,
        retention_days = config.session_retention_days,
        "Starting session cleanup task"
    );

    let cleanup = SessionCleanup::new(db, config);

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = cleanup.run_cleanup().await {
                tracing::error!(error = %e, "Cleanup cycle failed");
            }
        }
    });
}
