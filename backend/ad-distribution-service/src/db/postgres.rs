/// PostgreSQL Distribution Store
///
/// Expected tables (owned by the marketplace schema):
///
/// ```text
/// listings                 (id uuid pk, advertiser_id uuid, tier text, created_at timestamptz, is_active bool)
/// ad_impressions           (id uuid pk, listing_id uuid, placement text, viewer_id uuid null,
///                           session_id text null, shown_at timestamptz)
/// ad_distribution          (listing_id uuid pk, total_impressions bigint, last_shown_at timestamptz,
///                           fairness_score double precision, fairness_updated_at timestamptz)
/// ad_placement_impressions (listing_id uuid, placement text, impressions bigint,
///                           primary key (listing_id, placement))
/// ```
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error};
use uuid::Uuid;

use super::DistributionStore;
use crate::error::{AppError, Result};
use crate::models::{AdTier, DistributionAggregate, ImpressionRecord, Listing, Placement, WindowStats};

type ListingRow = (Uuid, Uuid, String, DateTime<Utc>, bool);
type AggregateRow = (Uuid, i64, DateTime<Utc>, f64, DateTime<Utc>);

pub struct PgDistributionStore {
    pool: PgPool,
}

impl PgDistributionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn listing_from_row(row: ListingRow) -> Result<Listing> {
        let (id, advertiser_id, tier, created_at, is_active) = row;
        Ok(Listing {
            id,
            advertiser_id,
            tier: tier.parse::<AdTier>()?,
            created_at,
            is_active,
        })
    }

    async fn fetch_aggregate(
        conn: &mut PgConnection,
        listing_id: Uuid,
    ) -> Result<Option<DistributionAggregate>> {
        let row = sqlx::query_as::<_, AggregateRow>(
            r#"
            SELECT listing_id, total_impressions, last_shown_at, fairness_score, fairness_updated_at
            FROM ad_distribution
            WHERE listing_id = $1
            "#,
        )
        .bind(listing_id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some((listing_id, total_impressions, last_shown_at, fairness_score, fairness_updated_at)) =
            row
        else {
            return Ok(None);
        };

        let placement_rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT placement, impressions
            FROM ad_placement_impressions
            WHERE listing_id = $1
            "#,
        )
        .bind(listing_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(DistributionAggregate {
            listing_id,
            total_impressions,
            placement_impressions: collect_placements(listing_id, placement_rows)?,
            last_shown_at,
            fairness_score,
            fairness_updated_at,
        }))
    }
}

/// Placement rows are written only from `Placement::as_str`, so an unknown name
/// means the per-placement counts can no longer sum to the total.
fn collect_placements(listing_id: Uuid, rows: Vec<(String, i64)>) -> Result<BTreeMap<Placement, i64>> {
    rows.into_iter()
        .map(|(name, count)| match name.parse::<Placement>() {
            Ok(placement) => Ok((placement, count)),
            Err(_) => {
                error!(listing_id = %listing_id, placement = %name, "Unknown placement row");
                Err(AppError::Internal(format!(
                    "unknown placement {:?} stored for listing {}",
                    name, listing_id
                )))
            }
        })
        .collect()
}

#[async_trait]
impl DistributionStore for PgDistributionStore {
    async fn eligible_listings(&self) -> Result<Vec<Listing>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT id, advertiser_id, tier, created_at, is_active
            FROM listings
            WHERE is_active = TRUE
              AND tier IN ('featured', 'premium')
            ORDER BY created_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load eligible listings: {}", e);
            AppError::from(e)
        })?;

        rows.into_iter().map(Self::listing_from_row).collect()
    }

    async fn append_impression(&self, record: &ImpressionRecord) -> Result<DistributionAggregate> {
        let mut tx = self.pool.begin().await?;

        // FOR SHARE blocks a concurrent deactivation until this transaction commits
        let active = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM listings
            WHERE id = $1 AND is_active = TRUE
            FOR SHARE
            "#,
        )
        .bind(record.listing_id)
        .fetch_optional(&mut *tx)
        .await?;

        if active.is_none() {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!(
                "active listing {}",
                record.listing_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO ad_impressions (id, listing_id, placement, viewer_id, session_id, shown_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.listing_id)
        .bind(record.placement.as_str())
        .bind(record.viewer_id)
        .bind(record.session_id.as_deref())
        .bind(record.shown_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO ad_distribution
                (listing_id, total_impressions, last_shown_at, fairness_score, fairness_updated_at)
            VALUES ($1, 1, $2, 100, $2)
            ON CONFLICT (listing_id) DO UPDATE SET
                total_impressions = ad_distribution.total_impressions + 1,
                last_shown_at = GREATEST(ad_distribution.last_shown_at, EXCLUDED.last_shown_at)
            "#,
        )
        .bind(record.listing_id)
        .bind(record.shown_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO ad_placement_impressions (listing_id, placement, impressions)
            VALUES ($1, $2, 1)
            ON CONFLICT (listing_id, placement) DO UPDATE SET
                impressions = ad_placement_impressions.impressions + 1
            "#,
        )
        .bind(record.listing_id)
        .bind(record.placement.as_str())
        .execute(&mut *tx)
        .await?;

        let aggregate = Self::fetch_aggregate(&mut tx, record.listing_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "aggregate for {} missing after upsert",
                    record.listing_id
                ))
            })?;

        tx.commit().await?;

        debug!(
            listing_id = %record.listing_id,
            placement = %record.placement,
            total_impressions = aggregate.total_impressions,
            "Impression appended"
        );

        Ok(aggregate)
    }

    async fn window_stats(&self, listing_id: Uuid, since: DateTime<Utc>) -> Result<WindowStats> {
        let (listing_impressions, total_impressions, eligible_listings) =
            sqlx::query_as::<_, (i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE i.listing_id = $1),
                    COUNT(*) FILTER (
                        WHERE l.is_active = TRUE AND l.tier IN ('featured', 'premium')
                    ),
                    (
                        SELECT COUNT(*) FROM listings
                        WHERE is_active = TRUE AND tier IN ('featured', 'premium')
                    )
                FROM ad_impressions i
                JOIN listings l ON l.id = i.listing_id
                WHERE i.shown_at >= $2
                "#,
            )
            .bind(listing_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(WindowStats {
            listing_impressions,
            total_impressions,
            eligible_listings,
        })
    }

    async fn window_stats_many(
        &self,
        listing_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, WindowStats>> {
        if listing_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut tx = self.pool.begin().await?;
        // One snapshot for the per-listing counts and the shared totals
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let per_listing = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT listing_id, COUNT(*)
            FROM ad_impressions
            WHERE listing_id = ANY($1) AND shown_at >= $2
            GROUP BY listing_id
            "#,
        )
        .bind(listing_ids)
        .bind(since)
        .fetch_all(&mut *tx)
        .await?;

        let (total_impressions, eligible_listings) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (
                    SELECT COUNT(*)
                    FROM ad_impressions i
                    JOIN listings l ON l.id = i.listing_id
                    WHERE i.shown_at >= $1
                      AND l.is_active = TRUE
                      AND l.tier IN ('featured', 'premium')
                ),
                (
                    SELECT COUNT(*) FROM listings
                    WHERE is_active = TRUE AND tier IN ('featured', 'premium')
                )
            "#,
        )
        .bind(since)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let counts: HashMap<Uuid, i64> = per_listing.into_iter().collect();
        Ok(listing_ids
            .iter()
            .map(|id| {
                let stats = WindowStats {
                    listing_impressions: counts.get(id).copied().unwrap_or(0),
                    total_impressions,
                    eligible_listings,
                };
                (*id, stats)
            })
            .collect())
    }

    async fn update_fairness(
        &self,
        listing_id: Uuid,
        score: f64,
        computed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ad_distribution
            SET fairness_score = $2, fairness_updated_at = $3
            WHERE listing_id = $1
            "#,
        )
        .bind(listing_id)
        .bind(score)
        .bind(computed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_distribution(&self, listing_id: Uuid) -> Result<Option<DistributionAggregate>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_aggregate(&mut conn, listing_id).await
    }

    async fn get_distributions(
        &self,
        listing_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, DistributionAggregate>> {
        if listing_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, AggregateRow>(
            r#"
            SELECT listing_id, total_impressions, last_shown_at, fairness_score, fairness_updated_at
            FROM ad_distribution
            WHERE listing_id = ANY($1)
            "#,
        )
        .bind(listing_ids)
        .fetch_all(&self.pool)
        .await?;

        let placement_rows = sqlx::query_as::<_, (Uuid, String, i64)>(
            r#"
            SELECT listing_id, placement, impressions
            FROM ad_placement_impressions
            WHERE listing_id = ANY($1)
            "#,
        )
        .bind(listing_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut placements: HashMap<Uuid, Vec<(String, i64)>> = HashMap::new();
        for (listing_id, placement, impressions) in placement_rows {
            placements
                .entry(listing_id)
                .or_default()
                .push((placement, impressions));
        }

        let mut aggregates = HashMap::with_capacity(rows.len());
        for (listing_id, total_impressions, last_shown_at, fairness_score, fairness_updated_at) in rows
        {
            let counts = placements.remove(&listing_id).unwrap_or_default();
            aggregates.insert(
                listing_id,
                DistributionAggregate {
                    listing_id,
                    total_impressions,
                    placement_impressions: collect_placements(listing_id, counts)?,
                    last_shown_at,
                    fairness_score,
                    fairness_updated_at,
                },
            );
        }

        Ok(aggregates)
    }

    async fn stale_distributions(&self, computed_before: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT listing_id FROM ad_distribution
            WHERE fairness_updated_at <= $1
            "#,
        )
        .bind(computed_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
