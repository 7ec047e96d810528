//! Fairness Refresh Background Job
//!
//! Listings that stop being shown keep the fairness score computed at their last
//! impression. This job recomputes every cached score older than the trailing
//! window so `get_distribution` reflects decayed exposure, not only selection.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::error::Result;
use crate::metrics;
use crate::services::DistributionTracker;

pub async fn start_fairness_refresh(tracker: Arc<DistributionTracker>, interval: Duration) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        window_hours = tracker.window().num_hours(),
        "Starting fairness refresh background job"
    );

    loop {
        sleep(interval).await;
        // Failures are logged and counted by the cycle; the next tick retries
        run_refresh_cycle(&tracker, Utc::now()).await.ok();
    }
}

/// One refresh pass; failures are logged and counted, never propagated to the loop
pub async fn run_refresh_cycle(tracker: &DistributionTracker, now: DateTime<Utc>) -> Result<usize> {
    let cycle_start = Instant::now();

    match tracker.refresh_stale(now).await {
        Ok(refreshed) => {
            metrics::record_refresh_run("success");
            tracing::info!(
                refreshed = refreshed,
                duration_ms = cycle_start.elapsed().as_millis(),
                "Fairness refresh cycle completed"
            );
            Ok(refreshed)
        }
        Err(e) => {
            metrics::record_refresh_run("error");
            tracing::error!(
                error = %e,
                duration_ms = cycle_start.elapsed().as_millis(),
                "Fairness refresh cycle failed"
            );
            Err(e)
        }
    }
}
