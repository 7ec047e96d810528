/// Ranking Selector
///
/// Picks featured/premium listings for a placement slot.
///
/// # Workflow
/// 1. Load eligible listings (active, featured or premium)
/// 2. Load window counts for all of them in one batch
/// 3. Fairness from those counts (cached aggregate scores, then neutral, on failure)
/// 4. Score: tier * W_tier + recency * W_recency + fairness * W_fairness
/// 5. Sort descending; ties go to the newer listing, then the lower id
///
/// Selection never records impressions. The caller reports them once the ads are
/// actually rendered.
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::DistributionTracker;
use crate::config::RankingConfig;
use crate::db::DistributionStore;
use crate::error::Result;
use crate::metrics;
use crate::models::{AdTier, Listing, Placement, ScoreComponents, ScoredListing};
use crate::utils::{age_in_days, exponential_decay};

pub struct RankingSelector {
    store: Arc<dyn DistributionStore>,
    tracker: Arc<DistributionTracker>,
    config: RankingConfig,
}

impl RankingSelector {
    pub fn new(
        store: Arc<dyn DistributionStore>,
        tracker: Arc<DistributionTracker>,
        config: RankingConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            config,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub async fn select_ads(
        &self,
        placement: Placement,
        limit: usize,
        viewer_id: Option<Uuid>,
    ) -> Result<Vec<ScoredListing>> {
        self.select_ads_at(placement, limit, viewer_id, Utc::now())
            .await
    }

    pub async fn select_ads_at(
        &self,
        placement: Placement,
        limit: usize,
        viewer_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredListing>> {
        let start = Instant::now();

        if limit == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<Listing> = self
            .store
            .eligible_listings()
            .await?
            .into_iter()
            .filter(Listing::is_eligible)
            .collect();

        if candidates.is_empty() {
            debug!(placement = %placement, "No eligible listings for placement");
            metrics::record_selection(placement, start.elapsed());
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = candidates.iter().map(|l| l.id).collect();
        let fairness = self.resolve_fairness(placement, &ids, now).await;

        let mut scored = Vec::with_capacity(candidates.len());
        for listing in candidates {
            let listing_fairness = fairness
                .get(&listing.id)
                .copied()
                .unwrap_or(self.config.neutral_fairness);
            scored.push(self.score_listing(listing, listing_fairness, now));
        }

        scored.sort_by(compare_scored);
        scored.truncate(limit);

        metrics::record_selection(placement, start.elapsed());
        info!(
            placement = %placement,
            limit = limit,
            returned = scored.len(),
            viewer_id = ?viewer_id,
            "Ads selected"
        );

        Ok(scored)
    }

    /// Fairness for every candidate.
    ///
    /// Fresh window counts first; if those cannot be loaded, the cached aggregate
    /// scores; if those cannot be loaded either, the neutral default.
    async fn resolve_fairness(
        &self,
        placement: Placement,
        ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> HashMap<Uuid, f64> {
        let error = match self.tracker.fairness_many(ids, now).await {
            Ok(fairness) => return fairness,
            Err(e) => e,
        };
        warn!(
            placement = %placement,
            error = %error,
            "Window counts unavailable, falling back to cached fairness"
        );
        metrics::record_degraded("window_stats_unavailable");

        let aggregates = match self.store.get_distributions(ids).await {
            Ok(aggregates) => aggregates,
            Err(e) => {
                warn!(
                    placement = %placement,
                    error = %e,
                    "Distribution aggregates unavailable, using neutral fairness"
                );
                metrics::record_degraded("aggregates_unavailable");
                return HashMap::new();
            }
        };

        let mut fairness = HashMap::with_capacity(ids.len());
        for listing_id in ids {
            match self
                .tracker
                .current_fairness(*listing_id, aggregates.get(listing_id), now)
                .await
            {
                Ok(score) => {
                    fairness.insert(*listing_id, score);
                }
                Err(e) => {
                    warn!(
                        listing_id = %listing_id,
                        error = %e,
                        "Fairness unavailable, using neutral default"
                    );
                    metrics::record_degraded("fairness_recompute");
                }
            }
        }
        fairness
    }

    pub fn tier_value(&self, tier: AdTier) -> f64 {
        match tier {
            AdTier::Premium => self.config.premium_tier_value,
            AdTier::Featured => self.config.featured_tier_value,
            AdTier::Standard => 0.0,
        }
    }

    /// Recency on a 0-100 scale, halving every `recency_half_life_days`
    pub fn recency_value(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        100.0
            * exponential_decay(
                age_in_days(created_at, now),
                self.config.recency_half_life_days,
            )
    }

    pub fn score_listing(&self, listing: Listing, fairness: f64, now: DateTime<Utc>) -> ScoredListing {
        let components = ScoreComponents {
            tier: self.tier_value(listing.tier),
            recency: self.recency_value(listing.created_at, now),
            fairness,
        };
        let score = components.tier * self.config.weight_tier
            + components.recency * self.config.weight_recency
            + components.fairness * self.config.weight_fairness;

        ScoredListing {
            listing,
            score,
            components,
        }
    }
}

/// Descending score, then newer `created_at`, then ascending id
pub fn compare_scored(a: &ScoredListing, b: &ScoredListing) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.listing.created_at.cmp(&a.listing.created_at))
        .then_with(|| a.listing.id.cmp(&b.listing.id))
}
