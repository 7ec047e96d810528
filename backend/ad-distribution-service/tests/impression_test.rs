mod common;

use ad_distribution_service::jobs::run_refresh_cycle;
use ad_distribution_service::models::{AdTier, Placement};
use ad_distribution_service::AppError;
use chrono::{Duration, Utc};
use common::Harness;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_impression_on_deactivated_listing_is_not_found() {
    let h = Harness::new();
    let now = Utc::now();
    let listing = h.add_listing(AdTier::Premium, now, Duration::days(1));

    h.ads
        .recorder
        .record_impression_at(listing.id, Placement::HeaderBanner, None, None, now)
        .await
        .unwrap();
    let before = h
        .ads
        .tracker
        .get_distribution(listing.id)
        .await
        .unwrap()
        .unwrap();

    assert!(h.store.deactivate_listing(listing.id));

    let err = h
        .ads
        .recorder
        .record_impression_at(
            listing.id,
            Placement::HeaderBanner,
            Some(Uuid::new_v4()),
            None,
            now + Duration::seconds(5),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let after = h
        .ads
        .tracker
        .get_distribution(listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before, after);
    assert_eq!(h.store.impression_log(listing.id).len(), 1);
}

#[tokio::test]
async fn test_impression_on_unknown_listing_is_not_found() {
    let h = Harness::new();

    let err = h
        .ads
        .recorder
        .record_impression(Uuid::new_v4(), Placement::BetweenListings, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_placement_counts_sum_to_total() {
    let h = Harness::new();
    let now = Utc::now();
    let listing = h.add_listing(AdTier::Featured, now, Duration::days(2));

    let plan = [
        (Placement::HeaderBanner, 3),
        (Placement::BetweenListings, 5),
        (Placement::AdDetailsBottom, 1),
    ];
    for (placement, times) in plan {
        for _ in 0..times {
            h.ads
                .recorder
                .record_impression_at(listing.id, placement, None, Some("s-1".into()), now)
                .await
                .unwrap();
        }
    }

    let aggregate = h
        .ads
        .tracker
        .get_distribution(listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(aggregate.total_impressions, 9);
    assert_eq!(
        aggregate.placement_impressions.values().sum::<i64>(),
        aggregate.total_impressions
    );
    assert_eq!(aggregate.impressions_for(Placement::BetweenListings), 5);
    assert_eq!(aggregate.impressions_for(Placement::AdDetailsTop), 0);
    assert_eq!(aggregate.last_shown_at, now);
}

#[tokio::test]
async fn test_zero_impressions_in_window_is_full_fairness() {
    let h = Harness::new();
    let now = Utc::now();
    let quiet = h.add_listing(AdTier::Premium, now, Duration::days(1));
    let busy = h.add_listing(AdTier::Premium, now, Duration::days(1));

    for _ in 0..10 {
        h.ads
            .recorder
            .record_impression_at(busy.id, Placement::HeaderBanner, None, None, now)
            .await
            .unwrap();
    }

    let fairness = h.ads.tracker.compute_fairness(quiet.id, now).await.unwrap();
    assert_eq!(fairness, 100.0);

    let current = h
        .ads
        .tracker
        .current_fairness(quiet.id, None, now)
        .await
        .unwrap();
    assert_eq!(current, 100.0);
}

#[tokio::test]
async fn test_fairness_never_increases_with_more_impressions() {
    let h = Harness::new();
    let now = Utc::now();
    let target = h.add_listing(AdTier::Premium, now, Duration::days(1));
    let mut peers = Vec::new();
    for _ in 0..4 {
        peers.push(h.add_listing(AdTier::Featured, now, Duration::days(2)));
    }

    // Background activity so the window is not dominated by the target
    for peer in &peers {
        for _ in 0..10 {
            h.ads
                .recorder
                .record_impression_at(peer.id, Placement::BetweenListings, None, None, now)
                .await
                .unwrap();
        }
    }

    let mut previous = h.ads.tracker.compute_fairness(target.id, now).await.unwrap();
    assert_eq!(previous, 100.0);

    for _ in 0..15 {
        let aggregate = h
            .ads
            .recorder
            .record_impression_at(target.id, Placement::HeaderBanner, None, None, now)
            .await
            .unwrap();
        assert!(
            aggregate.fairness_score <= previous,
            "fairness rose from {} to {}",
            previous,
            aggregate.fairness_score
        );
        previous = aggregate.fairness_score;
    }
    assert!(previous < 100.0);
}

#[tokio::test]
async fn test_impressions_are_not_deduplicated() {
    let h = Harness::new();
    let now = Utc::now();
    let listing = h.add_listing(AdTier::Premium, now, Duration::days(1));
    let viewer = Uuid::new_v4();

    for _ in 0..3 {
        h.ads
            .recorder
            .record_impression_at(listing.id, Placement::HeaderBanner, Some(viewer), None, now)
            .await
            .unwrap();
    }

    let log = h.store.impression_log(listing.id);
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|r| r.viewer_id == Some(viewer)));
}

#[tokio::test]
async fn test_anonymous_impression_keeps_session_id() {
    let h = Harness::new();
    let now = Utc::now();
    let listing = h.add_listing(AdTier::Featured, now, Duration::days(1));

    h.ads
        .recorder
        .record_impression_at(
            listing.id,
            Placement::AdDetailsTop,
            None,
            Some("  anon-42 ".into()),
            now,
        )
        .await
        .unwrap();

    let log = h.store.impression_log(listing.id);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].viewer_id, None);
    assert_eq!(log[0].session_id.as_deref(), Some("anon-42"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_impressions_lose_no_updates() {
    let h = Harness::new();
    let now = Utc::now();
    let listing = h.add_listing(AdTier::Premium, now, Duration::days(1));
    let listing_id = listing.id;
    let recorder = h.ads.recorder.clone();

    let mut handles = Vec::new();
    for i in 0..64 {
        let recorder = Arc::clone(&recorder);
        let placement = Placement::ALL[i % Placement::ALL.len()];
        handles.push(tokio::spawn(async move {
            recorder
                .record_impression_at(listing_id, placement, None, None, now)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let aggregate = h
        .ads
        .tracker
        .get_distribution(listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(aggregate.total_impressions, 64);
    for placement in Placement::ALL {
        assert_eq!(aggregate.impressions_for(placement), 16);
    }
    assert_eq!(h.store.impression_log(listing.id).len(), 64);
}

#[tokio::test]
async fn test_refresh_cycle_decays_stale_scores() {
    let h = Harness::new();
    let now = Utc::now();
    let listing = h.add_listing(AdTier::Premium, now, Duration::days(3));
    h.add_listing(AdTier::Featured, now, Duration::days(3));

    let shown_at = now - Duration::hours(30);
    for _ in 0..5 {
        h.ads
            .recorder
            .record_impression_at(listing.id, Placement::HeaderBanner, None, None, shown_at)
            .await
            .unwrap();
    }
    let stale = h
        .ads
        .tracker
        .get_distribution(listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stale.fairness_score, 0.0);

    let refreshed = run_refresh_cycle(&h.ads.tracker, now).await.unwrap();
    assert_eq!(refreshed, 1);

    let fresh = h
        .ads
        .tracker
        .get_distribution(listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.fairness_score, 100.0);
    assert_eq!(fresh.fairness_updated_at, now);
    assert_eq!(fresh.total_impressions, 5);

    // Nothing is stale any more
    assert_eq!(run_refresh_cycle(&h.ads.tracker, now).await.unwrap(), 0);
}

#[tokio::test]
async fn test_score_exactly_one_window_old_is_refreshed() {
    let h = Harness::new();
    let now = Utc::now();
    let listing = h.add_listing(AdTier::Featured, now, Duration::days(5));

    let computed_at = now - h.ads.tracker.window();
    h.ads
        .recorder
        .record_impression_at(listing.id, Placement::BetweenListings, None, None, computed_at)
        .await
        .unwrap();

    let aggregate = h
        .ads
        .tracker
        .get_distribution(listing.id)
        .await
        .unwrap()
        .unwrap();
    assert!(h.ads.tracker.is_stale(&aggregate, now));

    // The refresh job agrees with the selector about the boundary
    assert_eq!(run_refresh_cycle(&h.ads.tracker, now).await.unwrap(), 1);
}
