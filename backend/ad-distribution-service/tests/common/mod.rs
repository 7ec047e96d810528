#![allow(dead_code)]

use ad_distribution_service::config::{FairnessConfig, RankingConfig};
use ad_distribution_service::models::{
    AdTier, DistributionAggregate, ImpressionRecord, Listing, WindowStats,
};
use ad_distribution_service::{
    AdDistribution, DistributionStore, InMemoryDistributionStore, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mockall::mock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

mock! {
    pub Store {}

    #[async_trait]
    impl DistributionStore for Store {
        async fn eligible_listings(&self) -> Result<Vec<Listing>>;
        async fn append_impression(&self, record: &ImpressionRecord) -> Result<DistributionAggregate>;
        async fn window_stats(&self, listing_id: Uuid, since: DateTime<Utc>) -> Result<WindowStats>;
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
        async fn stale_distributions(&self, computed_before: DateTime<Utc>) -> Result<Vec<Uuid>>;
        async fn ping(&self) -> Result<()>;
    }
}

pub fn listing(tier: AdTier, created_at: DateTime<Utc>) -> Listing {
    Listing {
        id: Uuid::new_v4(),
        advertiser_id: Uuid::new_v4(),
        tier,
        created_at,
        is_active: true,
    }
}

pub fn mock_distribution(store: MockStore) -> (Arc<dyn DistributionStore>, AdDistribution) {
    let store: Arc<dyn DistributionStore> = Arc::new(store);
    let ads = AdDistribution::new(
        store.clone(),
        RankingConfig::default(),
        FairnessConfig::default(),
    );
    (store, ads)
}

pub struct Harness {
    pub store: Arc<InMemoryDistributionStore>,
    pub ads: AdDistribution,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RankingConfig::default(), FairnessConfig::default())
    }

    pub fn with_config(ranking: RankingConfig, fairness: FairnessConfig) -> Self {
        let store = Arc::new(InMemoryDistributionStore::new());
        let dyn_store: Arc<dyn DistributionStore> = store.clone();
        let ads = AdDistribution::new(dyn_store, ranking, fairness);
        Self { store, ads }
    }

    /// Insert an active listing created `age` before `now`
    pub fn add_listing(&self, tier: AdTier, now: DateTime<Utc>, age: Duration) -> Listing {
        let listing = Listing {
            id: Uuid::new_v4(),
            advertiser_id: Uuid::new_v4(),
            tier,
            created_at: now - age,
            is_active: true,
        };
        self.store.upsert_listing(listing.clone());
        listing
    }
}
