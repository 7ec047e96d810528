/// Ad Placement API Handlers
///
/// HTTP endpoints used by the marketplace front end to fetch ranked ads and to
/// report impressions once ads are painted.
use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::AdHandlerState;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{AdTier, Placement, ScoreComponents, ScoredListing};

/// Query parameters for GET /api/v1/ads
#[derive(Debug, Deserialize)]
pub struct SelectAdsQuery {
    pub placement: String,

    /// Limit (default: 4, clamped to 1..=max_limit)
    #[serde(default = "default_limit")]
    pub limit: usize,

    pub viewer_id: Option<Uuid>,

    /// Listing currently open on an ad-details page
    pub exclude_listing_id: Option<Uuid>,
}

fn default_limit() -> usize {
    4
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RankedAd {
    pub listing_id: Uuid,
    pub advertiser_id: Uuid,
    pub tier: AdTier,
    pub created_at: DateTime<Utc>,
    pub score: f64,
    pub tier_score: f64,
    pub recency_score: f64,
    pub fairness_score: f64,
}

impl From<ScoredListing> for RankedAd {
    fn from(scored: ScoredListing) -> Self {
        let ScoreComponents {
            tier,
            recency,
            fairness,
        } = scored.components;
        Self {
            listing_id: scored.listing.id,
            advertiser_id: scored.listing.advertiser_id,
            tier: scored.listing.tier,
            created_at: scored.listing.created_at,
            score: scored.score,
            tier_score: tier,
            recency_score: recency,
            fairness_score: fairness,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectAdsResponse {
    pub placement: Placement,
    pub count: usize,
    pub ads: Vec<RankedAd>,
}

/// Impression report body
#[derive(Debug, Deserialize)]
pub struct ImpressionRequest {
    pub listing_id: Uuid,
    pub placement: String,
    pub viewer_id: Option<Uuid>,
    pub session_id: Option<String>,
}

/// GET /api/v1/ads
///
/// Ranked featured/premium listings for a placement. A store outage yields an
/// empty list rather than an error so pages keep rendering.
#[get("/api/v1/ads")]
pub async fn select_ads(
    query: web::Query<SelectAdsQuery>,
    state: web::Data<AdHandlerState>,
) -> Result<HttpResponse> {
    let placement: Placement = query.placement.parse()?;
    let limit = query.limit.clamp(1, state.max_limit);

    debug!(
        placement = %placement,
        limit = limit,
        exclude = ?query.exclude_listing_id,
        "Select ads request"
    );

    // Over-fetch by one so excluding the open listing still fills the slot
    let fetch = match query.exclude_listing_id {
        Some(_) => limit + 1,
        None => limit,
    };

    let mut ads = match state
        .ads
        .selector
        .select_ads(placement, fetch, query.viewer_id)
        .await
    {
        Ok(ads) => ads,
        Err(AppError::StoreUnavailable(msg)) => {
            warn!(
                placement = %placement,
                error = %msg,
                "Store unavailable for ad selection, returning empty placement"
            );
            metrics::record_degraded("store_unavailable");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    if let Some(excluded) = query.exclude_listing_id {
        ads.retain(|ad| ad.listing.id != excluded);
    }
    ads.truncate(limit);

    let ads: Vec<RankedAd> = ads.into_iter().map(RankedAd::from).collect();
    Ok(HttpResponse::Ok().json(SelectAdsResponse {
        placement,
        count: ads.len(),
        ads,
    }))
}

/// POST /api/v1/impressions
#[post("/api/v1/impressions")]
pub async fn record_impression(
    body: web::Json<ImpressionRequest>,
    state: web::Data<AdHandlerState>,
) -> Result<HttpResponse> {
    let ImpressionRequest {
        listing_id,
        placement,
        viewer_id,
        session_id,
    } = body.into_inner();
    let placement: Placement = placement.parse()?;

    let aggregate = state
        .ads
        .recorder
        .record_impression(listing_id, placement, viewer_id, session_id)
        .await?;

    Ok(HttpResponse::Created().json(aggregate))
}

/// GET /api/v1/distribution/{listing_id}
#[get("/api/v1/distribution/{listing_id}")]
pub async fn get_distribution(
    path: web::Path<Uuid>,
    state: web::Data<AdHandlerState>,
) -> Result<HttpResponse> {
    let listing_id = path.into_inner();

    match state.ads.tracker.get_distribution(listing_id).await? {
        Some(aggregate) => Ok(HttpResponse::Ok().json(aggregate)),
        None => Err(AppError::NotFound(format!(
            "no distribution for listing {}",
            listing_id
        ))),
    }
}
