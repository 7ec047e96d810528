pub mod ads;
pub mod health;

pub use ads::{get_distribution, record_impression, select_ads};
pub use health::{health_check, metrics_endpoint};

use actix_web::web;
use std::sync::Arc;

use crate::db::DistributionStore;
use crate::services::AdDistribution;

/// Shared state for the HTTP handlers
pub struct AdHandlerState {
    pub ads: AdDistribution,
    pub store: Arc<dyn DistributionStore>,
    pub max_limit: usize,
}

impl AdHandlerState {
    pub fn new(ads: AdDistribution, store: Arc<dyn DistributionStore>) -> Self {
        let max_limit = ads.selector.config().max_limit;
        Self {
            ads,
            store,
            max_limit,
        }
    }
}

/// Route table shared by `main` and the HTTP tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(select_ads)
        .service(record_impression)
        .service(get_distribution)
        .service(health_check)
        .service(metrics_endpoint);
}
