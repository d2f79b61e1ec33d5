//! Proximity aggregator - time-weighted summary statistics

use crate::domain::{ProximityError, ProximityRecord, Result, SummaryStats};

/// Summarize one run's records.
///
/// `mean_m` is weighted by days lived, so a residence held twice as long counts
/// twice as much. `min_m`/`max_m` range over the per-record distances.
pub fn summarize(records: &[ProximityRecord]) -> Result<SummaryStats> {
    if records.is_empty() {
        return Err(ProximityError::NoResolvedLocations { dropped: 0 });
    }

    let total_days: i64 = records.iter().map(|r| r.interval.duration_days).sum();
    if total_days == 0 {
        return Err(ProximityError::ZeroDuration);
    }

    let weighted_sum: f64 = records.iter().map(|r| r.weighted_distance_day_m).sum();
    let min_m = records.iter().map(|r| r.min_distance_m).fold(f64::INFINITY, f64::min);
    let max_m = records.iter().map(|r| r.min_distance_m).fold(f64::NEG_INFINITY, f64::max);

    // float rounding can push the mean a hair outside [min, max]
    let mean_m = (weighted_sum / total_days as f64).clamp(min_m, max_m);

    Ok(SummaryStats { mean_m, min_m, max_m })
}
