pub mod fairness;
pub mod impressions;
pub mod selector;

pub use fairness::{fairness_score, DistributionTracker};
pub use impressions::ImpressionRecorder;
pub use selector::{compare_scored, RankingSelector};

use std::sync::Arc;

use crate::config::{FairnessConfig, RankingConfig};
use crate::db::DistributionStore;

/// The three collaborating components wired over one store
#[derive(Clone)]
pub struct AdDistribution {
    pub tracker: Arc<DistributionTracker>,
    pub recorder: Arc<ImpressionRecorder>,
    pub selector: Arc<RankingSelector>,
}

impl AdDistribution {
    pub fn new(
        store: Arc<dyn DistributionStore>,
        ranking: RankingConfig,
        fairness: FairnessConfig,
    ) -> Self {
        let tracker = Arc::new(DistributionTracker::new(store.clone(), fairness));
        let recorder = Arc::new(ImpressionRecorder::new(store.clone(), tracker.clone()));
        let selector = Arc::new(RankingSelector::new(store, tracker.clone(), ranking));

        Self {
            tracker,
            recorder,
            selector,
        }
    }
}
