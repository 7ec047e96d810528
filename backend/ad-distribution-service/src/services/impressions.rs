/// Impression Recorder
///
/// Write path for "listing was rendered in a placement" events. Every call is
/// one distinct view; deduplication is left to the caller.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::DistributionTracker;
use crate::db::DistributionStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{DistributionAggregate, ImpressionRecord, Placement};

const MAX_SESSION_ID_LEN: usize = 128;

pub struct ImpressionRecorder {
    store: Arc<dyn DistributionStore>,
    tracker: Arc<DistributionTracker>,
}

impl ImpressionRecorder {
    pub fn new(store: Arc<dyn DistributionStore>, tracker: Arc<DistributionTracker>) -> Self {
        Self { store, tracker }
    }

    pub async fn record_impression(
        &self,
        listing_id: Uuid,
        placement: Placement,
        viewer_id: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<DistributionAggregate> {
        self.record_impression_at(listing_id, placement, viewer_id, session_id, Utc::now())
            .await
    }

    pub async fn record_impression_at(
        &self,
        listing_id: Uuid,
        placement: Placement,
        viewer_id: Option<Uuid>,
        session_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DistributionAggregate> {
        let session_id = normalize_session_id(session_id)?;
        let record = ImpressionRecord::new(listing_id, placement, viewer_id, session_id, now);

        let mut aggregate = match self.store.append_impression(&record).await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                let status = match e {
                    AppError::NotFound(_) => "not_found",
                    _ => "error",
                };
                metrics::record_impression(placement, status);
                return Err(e);
            }
        };

        // The impression is already stored; a failed recompute only leaves the cached score stale
        match self.tracker.recompute(listing_id, now).await {
            Ok(score) => {
                aggregate.fairness_score = score;
                aggregate.fairness_updated_at = now;
            }
            Err(e) => {
                warn!(
                    listing_id = %listing_id,
                    error = %e,
                    "Fairness recompute failed after impression"
                );
            }
        }

        metrics::record_impression(placement, "success");
        debug!(
            listing_id = %listing_id,
            placement = %placement,
            anonymous = viewer_id.is_none(),
            total_impressions = aggregate.total_impressions,
            fairness = aggregate.fairness_score,
            "Impression recorded"
        );

        Ok(aggregate)
    }
}

fn normalize_session_id(session_id: Option<String>) -> Result<Option<String>> {
    match session_id.map(|s| s.trim().to_string()) {
        Some(s) if s.is_empty() => Ok(None),
        Some(s) if s.len() > MAX_SESSION_ID_LEN => Err(AppError::Validation(format!(
            "session_id exceeds {} characters",
            MAX_SESSION_ID_LEN
        ))),
        other => Ok(other),
    }
}
