//! Retention maintenance task (SPEC_FULL AMBIENT-5).
//!
//! Periodically prunes `monitor_checks` rows older than the configured
//! retention window (spec §6: "older rows may be pruned by a maintenance
//! task"). Runs hourly, independent of the scheduler tick.

use crate::db::Repository;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

pub async fn run<R: Repository + 'static>(repo: Arc<R>, retention_days: u32, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => sweep(&repo, retention_days),
            _ = cancel.cancelled() => break,
        }
    }
}

fn sweep<R: Repository>(repo: &Arc<R>, retention_days: u32) {
    let before = Utc::now() - chrono::Duration::days(retention_days as i64);
    match repo.prune_checks_older_than(before) {
        Ok(deleted) if deleted > 0 => info!(deleted, retention_days, "pruned old monitor_checks rows"),
        Ok(_) => {}
        Err(err) => error!(error = %err, "retention sweep failed"),
    }
}
