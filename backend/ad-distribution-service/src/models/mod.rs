use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// Advertiser level of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdTier {
    Standard,
    Featured,
    Premium,
}

impl AdTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Featured => "featured",
            Self::Premium => "premium",
        }
    }

    /// Standard listings never enter the paid placement path
    pub fn is_promoted(&self) -> bool {
        matches!(self, Self::Featured | Self::Premium)
    }
}

impl fmt::Display for AdTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AdTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "featured" => Ok(Self::Featured),
            "premium" => Ok(Self::Premium),
            other => Err(AppError::Validation(format!("unknown ad tier: {}", other))),
        }
    }
}

/// Display slot for a ranked listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    HeaderBanner,
    BetweenListings,
    AdDetailsTop,
    AdDetailsBottom,
}

impl Placement {
    pub const ALL: [Placement; 4] = [
        Placement::HeaderBanner,
        Placement::BetweenListings,
        Placement::AdDetailsTop,
        Placement::AdDetailsBottom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeaderBanner => "header_banner",
            Self::BetweenListings => "between_listings",
            Self::AdDetailsTop => "ad_details_top",
            Self::AdDetailsBottom => "ad_details_bottom",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Placement {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Placement::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AppError::InvalidPlacement(s.to_string()))
    }
}

/// A vehicle listing as seen by the ranking engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub advertiser_id: Uuid,
    pub tier: AdTier,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Listing {
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.tier.is_promoted()
    }
}

/// One append-only "listing was shown" event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpressionRecord {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub placement: Placement,
    pub viewer_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub shown_at: DateTime<Utc>,
}

impl ImpressionRecord {
    pub fn new(
        listing_id: Uuid,
        placement: Placement,
        viewer_id: Option<Uuid>,
        session_id: Option<String>,
        shown_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            listing_id,
            placement,
            viewer_id,
            session_id,
            shown_at,
        }
    }
}

/// Per-listing exposure rollup, maintained incrementally on every impression.
///
/// `placement_impressions` always sums to `total_impressions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionAggregate {
    pub listing_id: Uuid,
    pub total_impressions: i64,
    pub placement_impressions: BTreeMap<Placement, i64>,
    pub last_shown_at: DateTime<Utc>,
    pub fairness_score: f64,
    pub fairness_updated_at: DateTime<Utc>,
}

impl DistributionAggregate {
    /// Row allocated on the first impression of a listing
    pub fn first_touch(listing_id: Uuid, shown_at: DateTime<Utc>) -> Self {
        Self {
            listing_id,
            total_impressions: 0,
            placement_impressions: BTreeMap::new(),
            last_shown_at: shown_at,
            fairness_score: 100.0,
            fairness_updated_at: shown_at,
        }
    }

    pub fn increment(&mut self, placement: Placement, shown_at: DateTime<Utc>) {
        self.total_impressions += 1;
        *self.placement_impressions.entry(placement).or_insert(0) += 1;
        if shown_at > self.last_shown_at {
            self.last_shown_at = shown_at;
        }
    }

    pub fn impressions_for(&self, placement: Placement) -> i64 {
        self.placement_impressions
            .get(&placement)
            .copied()
            .unwrap_or(0)
    }
}

/// Counts feeding the fairness formula for one listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    /// Impressions of the listing inside the trailing window
    pub listing_impressions: i64,
    /// Impressions of all eligible listings inside the trailing window
    pub total_impressions: i64,
    /// Currently eligible (active featured/premium) listings
    pub eligible_listings: i64,
}

/// Breakdown of a composite priority score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreComponents {
    pub tier: f64,
    pub recency: f64,
    pub fairness: f64,
}

/// Candidate with its priority score for a single selection call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredListing {
    pub listing: Listing,
    pub score: f64,
    pub components: ScoreComponents,
}
