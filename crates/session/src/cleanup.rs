//! Periodic cleanup of long-unseen session rows.
//!
//! Deactivated rows are kept around so refreshes racing a takeover can
//! still find them; this task is the one deletion path, removing rows
//! whose `last_seen` is older than the retention window. Runs on a fixed
//! interval until cancelled.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use quantdesk_db::repositories::SessionRepo;
use quantdesk_db::DbPool;

/// Default retention: 30 days unseen.
const DEFAULT_RETENTION_DAYS: i64 = 30;

/// How often the cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(6 * 3600);

/// Run the session cleanup loop until `cancel` is triggered.
pub async fn run(pool: DbPool, cancel: CancellationToken) {
    let retention_days: i64 = std::env::var("SESSION_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RETENTION_DAYS);

    tracing::info!(
        retention_days,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Session cleanup started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session cleanup stopping");
                break;
            }
            _ = interval.tick() => {
                let cutoff = Utc::now() - chrono::Duration::days(retention_days);
                match SessionRepo::cleanup_stale(&pool, cutoff).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Session cleanup: purged stale rows");
                        } else {
                            tracing::debug!("Session cleanup: nothing to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Session cleanup failed");
                    }
                }
            }
        }
    }
}
