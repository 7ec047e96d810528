// ============================================
// Distribution Tracker
// ============================================
//
// Maintains the cached fairness score on each distribution aggregate.
//
// Fairness formula:
//   expected  = window_total / eligible_listings
//   fairness  = clamp(100 - recent / expected * 100, 0, 100)
//
// Where:
//   - recent: the listing's impressions inside the trailing window
//   - window_total: impressions of all eligible listings inside the window
//   - eligible_listings: active featured/premium listings
//
// 100 = under-exposed (deserves priority), 0 = at or above its even share.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FairnessConfig;
use crate::db::DistributionStore;
use crate::error::Result;
use crate::models::{DistributionAggregate, WindowStats};
use crate::utils::clamp_score;

pub const MAX_FAIRNESS: f64 = 100.0;

/// Fairness for one listing given its window counts
pub fn fairness_score(stats: &WindowStats) -> f64 {
    if stats.listing_impressions <= 0 {
        return MAX_FAIRNESS;
    }
    if stats.total_impressions <= 0 || stats.eligible_listings <= 0 {
        return MAX_FAIRNESS;
    }

    let expected_share = stats.total_impressions as f64 / stats.eligible_listings as f64;
    let exposure_ratio = stats.listing_impressions as f64 / expected_share;

    clamp_score(MAX_FAIRNESS - exposure_ratio * 100.0)
}

pub struct DistributionTracker {
    store: Arc<dyn DistributionStore>,
    config: FairnessConfig,
}

impl DistributionTracker {
    pub fn new(store: Arc<dyn DistributionStore>, config: FairnessConfig) -> Self {
        Self { store, config }
    }

    pub fn window(&self) -> Duration {
        self.config.window()
    }

    pub async fn get_distribution(&self, listing_id: Uuid) -> Result<Option<DistributionAggregate>> {
        self.store.get_distribution(listing_id).await
    }

    /// Fresh fairness from the store's window counts, without persisting it
    pub async fn compute_fairness(&self, listing_id: Uuid, now: DateTime<Utc>) -> Result<f64> {
        let stats = self.store.window_stats(listing_id, now - self.window()).await?;
        let score = fairness_score(&stats);

        debug!(
            listing_id = %listing_id,
            recent = stats.listing_impressions,
            window_total = stats.total_impressions,
            eligible = stats.eligible_listings,
            fairness = score,
            "Fairness computed"
        );

        Ok(score)
    }

    /// Fresh fairness for a batch of listings, all measured against the same window totals
    pub async fn fairness_many(
        &self,
        listing_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, f64>> {
        let stats = self
            .store
            .window_stats_many(listing_ids, now - self.window())
            .await?;

        Ok(listing_ids
            .iter()
            .map(|id| {
                let score = stats.get(id).map(fairness_score).unwrap_or(MAX_FAIRNESS);
                (*id, score)
            })
            .collect())
    }

    /// Compute and persist the fairness score for a listing
    pub async fn recompute(&self, listing_id: Uuid, now: DateTime<Utc>) -> Result<f64> {
        let score = self.compute_fairness(listing_id, now).await?;
        self.store.update_fairness(listing_id, score, now).await?;
        Ok(score)
    }

    pub fn is_stale(&self, aggregate: &DistributionAggregate, now: DateTime<Utc>) -> bool {
        aggregate.fairness_updated_at <= now - self.window()
    }

    /// Fairness from a cached aggregate, used when window counts cannot be batched.
    ///
    /// No aggregate, or nothing shown inside the window, means full fairness. A
    /// cached score at least one window old is recomputed in memory only.
    pub async fn current_fairness(
        &self,
        listing_id: Uuid,
        aggregate: Option<&DistributionAggregate>,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        let Some(aggregate) = aggregate else {
            return Ok(MAX_FAIRNESS);
        };

        if aggregate.last_shown_at < now - self.window() {
            return Ok(MAX_FAIRNESS);
        }

        if self.is_stale(aggregate, now) {
            return self.compute_fairness(listing_id, now).await;
        }

        Ok(aggregate.fairness_score)
    }

    /// Recompute every cached score older than the window.
    ///
    /// Individual failures are logged and skipped; returns the number refreshed.
    pub async fn refresh_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let stale = self
            .store
            .stale_distributions(now - self.window())
            .await?;

        let mut refreshed = 0;
        for listing_id in &stale {
            match self.recompute(*listing_id, now).await {
                Ok(_) => refreshed += 1,
                Err(e) => warn!(
                    listing_id = %listing_id,
                    error = %e,
                    "Failed to refresh fairness score"
                ),
            }
        }

        info!(
            stale = stale.len(),
            refreshed = refreshed,
            "Refreshed stale fairness scores"
        );

        Ok(refreshed)
    }
}
