mod common;

use ad_distribution_service::jobs::run_refresh_cycle;
use ad_distribution_service::models::{AdTier, DistributionAggregate, Placement, WindowStats};
use ad_distribution_service::AppError;
use chrono::{Duration, Utc};
use common::{listing, mock_distribution, MockStore};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

fn aggregate(
    listing_id: Uuid,
    fairness: f64,
    last_shown_at: chrono::DateTime<Utc>,
    fairness_updated_at: chrono::DateTime<Utc>,
) -> DistributionAggregate {
    DistributionAggregate {
        listing_id,
        total_impressions: 4,
        placement_impressions: BTreeMap::from([(Placement::HeaderBanner, 4)]),
        last_shown_at,
        fairness_score: fairness,
        fairness_updated_at,
    }
}

#[tokio::test]
async fn test_fresh_window_counts_skip_cached_aggregates() {
    let now = Utc::now();
    let shown = listing(AdTier::Premium, now - Duration::days(1));
    let quiet = listing(AdTier::Premium, now - Duration::days(1));

    let mut store = MockStore::new();
    let eligible = vec![shown.clone(), quiet.clone()];
    store
        .expect_eligible_listings()
        .returning(move || Ok(eligible.clone()));
    let (shown_id, quiet_id) = (shown.id, quiet.id);
    store.expect_window_stats_many().times(1).returning(move |_, _| {
        Ok(HashMap::from([
            (
                shown_id,
                WindowStats {
                    listing_impressions: 5,
                    total_impressions: 20,
                    eligible_listings: 2,
                },
            ),
            (
                quiet_id,
                WindowStats {
                    listing_impressions: 15,
                    total_impressions: 20,
                    eligible_listings: 2,
                },
            ),
        ]))
    });
    store.expect_get_distributions().times(0);
    store.expect_update_fairness().times(0);

    let (_, ads) = mock_distribution(store);
    let ranked = ads
        .selector
        .select_ads_at(Placement::HeaderBanner, 2, None, now)
        .await
        .unwrap();

    assert_eq!(ranked[0].listing.id, shown.id);
    assert!((ranked[0].components.fairness - 50.0).abs() < 1e-9);
    assert_eq!(ranked[1].components.fairness, 0.0);
}

#[tokio::test]
async fn test_no_fairness_source_falls_back_to_neutral() {
    let now = Utc::now();
    let listings = vec![
        listing(AdTier::Premium, now - Duration::days(1)),
        listing(AdTier::Featured, now - Duration::days(2)),
    ];

    let mut store = MockStore::new();
    let eligible = listings.clone();
    store
        .expect_eligible_listings()
        .returning(move || Ok(eligible.clone()));
    store
        .expect_window_stats_many()
        .returning(|_, _| Err(AppError::StoreUnavailable("statement timeout".into())));
    store
        .expect_get_distributions()
        .returning(|_| Err(AppError::StoreUnavailable("connection reset".into())));
    store.expect_window_stats().times(0);

    let (_, ads) = mock_distribution(store);
    let ranked = ads
        .selector
        .select_ads_at(Placement::HeaderBanner, 5, None, now)
        .await
        .unwrap();

    assert_eq!(ranked.len(), 2);
    assert!(ranked.iter().all(|s| s.components.fairness == 50.0));
    assert_eq!(ranked[0].listing.id, listings[0].id);
}

#[tokio::test]
async fn test_cached_fallback_degrades_only_failed_recompute() {
    let now = Utc::now();
    let fresh = listing(AdTier::Premium, now - Duration::days(1));
    let stale = listing(AdTier::Premium, now - Duration::days(1));

    let mut aggregates = HashMap::new();
    aggregates.insert(
        fresh.id,
        aggregate(fresh.id, 20.0, now - Duration::hours(1), now - Duration::hours(1)),
    );
    aggregates.insert(
        stale.id,
        aggregate(stale.id, 0.0, now - Duration::hours(2), now - Duration::hours(25)),
    );

    let mut store = MockStore::new();
    let eligible = vec![fresh.clone(), stale.clone()];
    store
        .expect_eligible_listings()
        .returning(move || Ok(eligible.clone()));
    store
        .expect_window_stats_many()
        .returning(|_, _| Err(AppError::StoreUnavailable("replica lag".into())));
    store
        .expect_get_distributions()
        .returning(move |_| Ok(aggregates.clone()));
    store
        .expect_window_stats()
        .times(1)
        .returning(|_, _| Err(AppError::StoreUnavailable("timeout".into())));
    store.expect_update_fairness().times(0);

    let (_, ads) = mock_distribution(store);
    let ranked = ads
        .selector
        .select_ads_at(Placement::BetweenListings, 2, None, now)
        .await
        .unwrap();

    let fairness_of = |id: Uuid| {
        ranked
            .iter()
            .find(|s| s.listing.id == id)
            .map(|s| s.components.fairness)
            .unwrap()
    };
    assert_eq!(fairness_of(fresh.id), 20.0);
    assert_eq!(fairness_of(stale.id), 50.0);
}

#[tokio::test]
async fn test_unavailable_listing_set_is_reported() {
    let mut store = MockStore::new();
    store
        .expect_eligible_listings()
        .returning(|| Err(AppError::StoreUnavailable("pool timed out".into())));

    let (_, ads) = mock_distribution(store);
    let err = ads
        .selector
        .select_ads(Placement::HeaderBanner, 3, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_impression_kept_when_fairness_recompute_fails() {
    let now = Utc::now();
    let listing_id = Uuid::new_v4();
    let appended = aggregate(listing_id, 35.0, now, now - Duration::minutes(10));
    let expected = appended.clone();

    let mut store = MockStore::new();
    store
        .expect_append_impression()
        .times(1)
        .returning(move |_| Ok(appended.clone()));
    store
        .expect_window_stats()
        .returning(|_, _| Err(AppError::StoreUnavailable("replica lag".into())));
    store.expect_update_fairness().times(0);

    let (_, ads) = mock_distribution(store);
    let result = ads
        .recorder
        .record_impression_at(listing_id, Placement::HeaderBanner, None, None, now)
        .await
        .unwrap();

    assert_eq!(result, expected);
}

#[tokio::test]
async fn test_not_found_impression_skips_fairness_update() {
    let mut store = MockStore::new();
    store
        .expect_append_impression()
        .returning(|record| Err(AppError::NotFound(format!("active listing {}", record.listing_id))));
    store.expect_window_stats().times(0);
    store.expect_update_fairness().times(0);

    let (_, ads) = mock_distribution(store);
    let err = ads
        .recorder
        .record_impression(Uuid::new_v4(), Placement::AdDetailsBottom, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_refresh_cycle_reports_unreadable_store() {
    let mut store = MockStore::new();
    store
        .expect_stale_distributions()
        .returning(|_| Err(AppError::StoreUnavailable("pool closed".into())));
    store.expect_update_fairness().times(0);

    let (_, ads) = mock_distribution(store);
    let err = run_refresh_cycle(&ads.tracker, Utc::now()).await.unwrap_err();
    assert!(matches!(err, AppError::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_refresh_cycle_skips_listings_that_fail() {
    let healthy = Uuid::new_v4();
    let broken = Uuid::new_v4();

    let mut store = MockStore::new();
    store
        .expect_stale_distributions()
        .returning(move |_| Ok(vec![healthy, broken]));
    store.expect_window_stats().returning(move |id, _| {
        if id == broken {
            Err(AppError::StoreUnavailable("timeout".into()))
        } else {
            Ok(WindowStats::default())
        }
    });
    store
        .expect_update_fairness()
        .withf(move |id, score, _| *id == healthy && *score == 100.0)
        .times(1)
        .returning(|_, _, _| Ok(()));

    let (_, ads) = mock_distribution(store);
    let refreshed = run_refresh_cycle(&ads.tracker, Utc::now()).await.unwrap();
    assert_eq!(refreshed, 1);
}
