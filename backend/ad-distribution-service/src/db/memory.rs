//! DashMap-backed store for local development and tests.
//!
//! Lock order is always listings -> impressions -> aggregates, and readers never
//! hold a guard on one map while locking another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::DistributionStore;
use crate::error::{AppError, Result};
use crate::models::{DistributionAggregate, ImpressionRecord, Listing, WindowStats};

#[derive(Default)]
pub struct InMemoryDistributionStore {
    listings: DashMap<Uuid, Listing>,
    impressions: DashMap<Uuid, Vec<ImpressionRecord>>,
    aggregates: DashMap<Uuid, DistributionAggregate>,
}

impl InMemoryDistributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_listing(&self, listing: Listing) {
        self.listings.insert(listing.id, listing);
    }

    /// Soft-remove a listing; returns false when it does not exist
    pub fn deactivate_listing(&self, listing_id: Uuid) -> bool {
        match self.listings.get_mut(&listing_id) {
            Some(mut listing) => {
                listing.is_active = false;
                true
            }
            None => false,
        }
    }

    pub fn impression_log(&self, listing_id: Uuid) -> Vec<ImpressionRecord> {
        self.impressions
            .get(&listing_id)
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DistributionStore for InMemoryDistributionStore {
    async fn eligible_listings(&self) -> Result<Vec<Listing>> {
        let mut listings: Vec<Listing> = self
            .listings
            .iter()
            .filter(|entry| entry.is_eligible())
            .map(|entry| entry.value().clone())
            .collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(listings)
    }

    async fn append_impression(&self, record: &ImpressionRecord) -> Result<DistributionAggregate> {
        // Holding the listing guard keeps a concurrent deactivation out until the write lands
        let listing = self
            .listings
            .get(&record.listing_id)
            .filter(|listing| listing.is_active)
            .ok_or_else(|| {
                AppError::NotFound(format!("active listing {}", record.listing_id))
            })?;

        self.impressions
            .entry(record.listing_id)
            .or_default()
            .push(record.clone());

        let snapshot = {
            let mut aggregate = self
                .aggregates
                .entry(record.listing_id)
                .or_insert_with(|| {
                    DistributionAggregate::first_touch(record.listing_id, record.shown_at)
                });
            aggregate.increment(record.placement, record.shown_at);
            aggregate.clone()
        };

        drop(listing);
        Ok(snapshot)
    }

    async fn window_stats(&self, listing_id: Uuid, since: DateTime<Utc>) -> Result<WindowStats> {
        let eligible: HashSet<Uuid> = self
            .listings
            .iter()
            .filter(|entry| entry.is_eligible())
            .map(|entry| *entry.key())
            .collect();

        let mut stats = WindowStats {
            eligible_listings: eligible.len() as i64,
            ..Default::default()
        };

        for entry in self.impressions.iter() {
            let in_window = entry
                .value()
                .iter()
                .filter(|record| record.shown_at >= since)
                .count() as i64;

            if *entry.key() == listing_id {
                stats.listing_impressions = in_window;
            }
            if eligible.contains(entry.key()) {
                stats.total_impressions += in_window;
            }
        }

        Ok(stats)
    }

    async fn window_stats_many(
        &self,
        listing_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, WindowStats>> {
        let eligible: HashSet<Uuid> = self
            .listings
            .iter()
            .filter(|entry| entry.is_eligible())
            .map(|entry| *entry.key())
            .collect();
        let requested: HashSet<Uuid> = listing_ids.iter().copied().collect();

        let mut per_listing: HashMap<Uuid, i64> = HashMap::new();
        let mut total_impressions = 0;
        for entry in self.impressions.iter() {
            let in_window = entry
                .value()
                .iter()
                .filter(|record| record.shown_at >= since)
                .count() as i64;

            if requested.contains(entry.key()) {
                per_listing.insert(*entry.key(), in_window);
            }
            if eligible.contains(entry.key()) {
                total_impressions += in_window;
            }
        }

        Ok(requested
            .into_iter()
            .map(|id| {
                let stats = WindowStats {
                    listing_impressions: per_listing.get(&id).copied().unwrap_or(0),
                    total_impressions,
                    eligible_listings: eligible.len() as i64,
                };
                (id, stats)
            })
            .collect())
    }

    async fn update_fairness(
        &self,
        listing_id: Uuid,
        score: f64,
        computed_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(mut aggregate) = self.aggregates.get_mut(&listing_id) {
            aggregate.fairness_score = score;
            aggregate.fairness_updated_at = computed_at;
        }
        Ok(())
    }

    async fn get_distribution(&self, listing_id: Uuid) -> Result<Option<DistributionAggregate>> {
        Ok(self
            .aggregates
            .get(&listing_id)
            .map(|aggregate| aggregate.clone()))
    }

    async fn get_distributions(
        &self,
        listing_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, DistributionAggregate>> {
        Ok(listing_ids
            .iter()
            .filter_map(|id| {
                self.aggregates
                    .get(id)
                    .map(|aggregate| (*id, aggregate.clone()))
            })
            .collect())
    }

    async fn stale_distributions(&self, computed_before: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(self
            .aggregates
            .iter()
            .filter(|entry| entry.fairness_updated_at <= computed_before)
            .map(|entry| *entry.key())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
