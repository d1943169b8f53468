//! Stability scoring, drift prediction and trend statistics.
//!
//! Everything here is a pure function of a lifecycle (or the ledger) and a
//! supplied `now`, so scores are reproducible under a fixed clock.

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::error::{HistoryError, HistoryResult};

use super::models::{DriftPrediction, DriftTrends, ResourceChange, ResourceLifecycle};

/// Confidence reported when fewer than two drift intervals are known.
pub const MIN_PREDICTION_CONFIDENCE: f64 = 0.1;

/// Score in `[0, 1]`; 1.0 is perfectly stable.
///
/// `1 - 0.01 * changes_per_day - 0.1 * drifts - 0.2 * recreations`, with the
/// age floored at one day, clamped to `[0, 1]`.
pub fn stability_score(
    total_changes: usize,
    drift_count: usize,
    recreate_count: usize,
    first_seen: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let age_days = ((now - first_seen).num_seconds() as f64 / 86_400.0).max(1.0);
    let frequency = total_changes as f64 / age_days;

    let score = 1.0
        - frequency * 0.01
        - drift_count as f64 * 0.1
        - recreate_count as f64 * 0.2;
    score.clamp(0.0, 1.0)
}

pub fn lifecycle_stability(lifecycle: &ResourceLifecycle, now: DateTime<Utc>) -> f64 {
    stability_score(
        lifecycle.total_changes,
        lifecycle.drift_count,
        lifecycle.recreate_count,
        lifecycle.first_seen,
        now,
    )
}

/// Intervals between consecutive drift events, in milliseconds.
pub fn drift_intervals(lifecycle: &ResourceLifecycle) -> Vec<i64> {
    lifecycle
        .drift_times()
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds())
        .collect()
}

/// Regularity of drift intervals mapped into `[0, 1]`.
///
/// `1 / (1 + stddev / mean)` plus `min(n / 100, 0.2)` for sample size.
pub fn prediction_confidence(intervals: &[i64]) -> f64 {
    if intervals.len() < 2 {
        return MIN_PREDICTION_CONFIDENCE;
    }

    let n = intervals.len() as f64;
    let mean = intervals.iter().map(|&i| i as f64).sum::<f64>() / n;
    let variance = intervals
        .iter()
        .map(|&i| {
            let d = i as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();

    // all drifts at the same instant: perfectly regular
    let ratio = if mean > 0.0 { std_dev / mean } else { 0.0 };
    let confidence = 1.0 / (1.0 + ratio) + (n / 100.0).min(0.2);
    confidence.clamp(0.0, 1.0)
}

/// Last drift plus the mean drift interval.
pub fn predict_next_drift(lifecycle: &ResourceLifecycle) -> HistoryResult<DriftPrediction> {
    let times = lifecycle.drift_times();
    let last = match times.last() {
        Some(last) if times.len() >= 2 => *last,
        _ => {
            return Err(HistoryError::InsufficientHistory {
                key: lifecycle.key(),
                drift_events: times.len(),
            })
        }
    };

    let intervals = drift_intervals(lifecycle);
    let mean_ms = intervals.iter().sum::<i64>() / intervals.len() as i64;

    Ok(DriftPrediction {
        resource_id: lifecycle.resource_id.clone(),
        provider: lifecycle.provider.clone(),
        predicted_time: last + Duration::milliseconds(mean_ms),
        confidence: prediction_confidence(&intervals),
        based_on: intervals.len(),
    })
}

pub fn drift_trends<'a>(changes: impl IntoIterator<Item = &'a ResourceChange>) -> DriftTrends {
    let mut trends = DriftTrends::default();

    for change in changes.into_iter().filter(|c| c.is_drift()) {
        trends.total_drifts += 1;
        *trends
            .daily_drifts
            .entry(change.timestamp.format("%Y-%m-%d").to_string())
            .or_default() += 1;
        *trends
            .hourly_pattern
            .entry(change.timestamp.hour())
            .or_default() += 1;
        *trends
            .provider_drifts
            .entry(change.provider.clone())
            .or_default() += 1;
        *trends
            .type_drifts
            .entry(change.resource_type.clone())
            .or_default() += 1;
    }

    // BTreeMap iterates hours ascending, so the first maximum is the earliest hour
    let mut peak: Option<(u32, usize)> = None;
    for (&hour, &count) in &trends.hourly_pattern {
        if peak.map_or(true, |(_, best)| count > best) {
            peak = Some((hour, count));
        }
    }
    trends.peak_hour = peak.map(|(hour, _)| hour);

    if !trends.daily_drifts.is_empty() {
        trends.avg_drift_rate = trends.total_drifts as f64 / trends.daily_drifts.len() as f64;
    }
    trends
}
