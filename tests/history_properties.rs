use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use driftmgr_core::clock::FixedClock;
use driftmgr_core::history::snapshots::SnapshotStore;
use driftmgr_core::history::stability::{
    prediction_confidence, stability_score, MIN_PREDICTION_CONFIDENCE,
};
use driftmgr_core::history::{ChangeType, ResourceChange, StateSnapshot};
use driftmgr_core::{StateHistoryTracker, TrackerConfig};
use proptest::prelude::*;

fn base() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn empty_snapshot(id: String, at: chrono::DateTime<Utc>) -> StateSnapshot {
    StateSnapshot {
        id,
        timestamp: at,
        state_file: "terraform.tfstate".to_string(),
        resources: Vec::new(),
        metadata: serde_json::Value::Null,
        hash: String::new(),
        previous: None,
    }
}

proptest! {
    #[test]
    fn stability_is_bounded(
        total in 0usize..10_000,
        drifts in 0usize..100,
        recreates in 0usize..100,
        age_hours in 0i64..100_000,
    ) {
        let score = stability_score(total, drifts, recreates, base(), base() + Duration::hours(age_hours));
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn stability_never_rises_with_more_drift_or_recreation(
        total in 0usize..1_000,
        drifts in 0usize..20,
        recreates in 0usize..20,
        age_days in 0i64..365,
    ) {
        let now = base() + Duration::days(age_days);
        let score = stability_score(total, drifts, recreates, base(), now);
        prop_assert!(stability_score(total, drifts + 1, recreates, base(), now) <= score);
        prop_assert!(stability_score(total, drifts, recreates + 1, base(), now) <= score);
    }

    #[test]
    fn confidence_is_bounded(intervals in prop::collection::vec(0i64..10_000_000_000, 0..50)) {
        let confidence = prediction_confidence(&intervals);
        prop_assert!((0.0..=1.0).contains(&confidence));
        if intervals.len() < 2 {
            prop_assert_eq!(confidence, MIN_PREDICTION_CONFIDENCE);
        }
    }

    #[test]
    fn retention_keeps_exactly_the_window(
        ages_days in prop::collection::vec(0i64..200, 1..60),
        max in 1usize..40,
    ) {
        let now = base();
        let cutoff = now - Duration::days(90);
        let mut store = SnapshotStore::new(max, 90);

        for (i, age) in ages_days.iter().enumerate() {
            let before = store.len();
            store.insert(empty_snapshot(format!("s-{}", i), now - Duration::days(*age)), now);

            if before + 1 > max {
                let in_window = ages_days[..=i].iter().filter(|a| **a <= 90).count();
                prop_assert_eq!(store.len(), in_window);
                prop_assert!(store.sorted().iter().all(|s| s.timestamp >= cutoff));
            } else {
                prop_assert_eq!(store.len(), before + 1);
            }
        }
    }
}

#[test]
fn test_thousand_and_five_snapshots_prune_to_window() {
    let now = base();
    let tracker =
        StateHistoryTracker::with_clock(TrackerConfig::default(), Arc::new(FixedClock::new(now)));

    for i in 0..10 {
        tracker.add_snapshot(empty_snapshot(format!("old-{}", i), now - Duration::days(91 + i)));
    }
    for i in 0..995 {
        tracker.add_snapshot(empty_snapshot(format!("recent-{}", i), now - Duration::hours(i)));
    }

    assert_eq!(tracker.snapshot_count(), 995);
}

#[test]
fn test_prediction_after_three_even_drifts() {
    let t = base();
    let tracker = StateHistoryTracker::with_clock(
        TrackerConfig::default(),
        Arc::new(FixedClock::new(t + Duration::days(30))),
    );
    tracker
        .track_change(ResourceChange::new("i-1", "aws_instance", "aws", ChangeType::Created, t))
        .unwrap();
    for days in [10, 20, 30] {
        tracker
            .track_change(ResourceChange::new(
                "i-1",
                "aws_instance",
                "aws",
                ChangeType::Drifted,
                t + Duration::days(days),
            ))
            .unwrap();
    }

    let prediction = tracker.predict_next_drift("i-1", "aws").unwrap();
    assert_eq!(prediction.predicted_time, t + Duration::days(40));
    assert!(prediction.confidence > MIN_PREDICTION_CONFIDENCE);

    let lifecycle = tracker.resource_lifecycle("i-1", "aws").unwrap();
    assert!((0.0..=1.0).contains(&lifecycle.stability));
}

#[test]
fn test_stability_worked_example() {
    let score = stability_score(50, 2, 1, base(), base() + Duration::days(10));
    assert!((score - 0.55).abs() < 1e-9);
}
