/// Distribution Store
///
/// Persistence boundary for listings, impressions and distribution aggregates.
///
/// The marketplace owns the `listings` table; this service appends to
/// `ad_impressions` and maintains `ad_distribution` / `ad_placement_impressions`
/// through increment-on-conflict upserts.
pub mod memory;
pub mod pool;
pub mod postgres;

pub use memory::InMemoryDistributionStore;
pub use pool::create_pool;
pub use postgres::PgDistributionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{DistributionAggregate, ImpressionRecord, Listing, WindowStats};

#[async_trait]
pub trait DistributionStore: Send + Sync {
    /// Active featured/premium listings
    async fn eligible_listings(&self) -> Result<Vec<Listing>>;

    /// Append one impression and bump the listing's counters as a single atomic step.
    ///
    /// Fails with `NotFound` (and writes nothing) when the listing is missing or inactive.
    async fn append_impression(&self, record: &ImpressionRecord) -> Result<DistributionAggregate>;

    /// Impression counts since `since` for the fairness formula
    async fn window_stats(&self, listing_id: Uuid, since: DateTime<Utc>) -> Result<WindowStats>;

    /// `window_stats` for many listings against one snapshot of the window totals.
    ///
    /// Every requested id is present in the result; listings with no impressions
    /// in the window get `listing_impressions == 0`.
    async fn window_stats_many(
        &self,
        listing_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, WindowStats>>;

    async fn update_fairness(
        &self,
        listing_id: Uuid,
        score: f64,
        computed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_distribution(&self, listing_id: Uuid) -> Result<Option<DistributionAggregate>>;

    async fn get_distributions(
        &self,
        listing_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, DistributionAggregate>>;

    /// Listings whose cached fairness score was computed at or before `computed_before`
    async fn stale_distributions(&self, computed_before: DateTime<Utc>) -> Result<Vec<Uuid>>;

    async fn ping(&self) -> Result<()>;
}
