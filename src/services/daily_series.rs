//! Daily series reconstructor - one distance value per calendar day

use crate::domain::{DailySeriesPoint, ProximityRecord};
use crate::services::timeline::close_at_present;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Expand interval-dated records into a gap-free daily series.
///
/// Each record contributes its distance on its start date, and the last
/// distance is carried to `today`. Every other day takes the most recent
/// earlier value (forward fill). The series covers
/// `[first start date, max(last start date, today)]`, one point per day.
pub fn daily_series(records: &[ProximityRecord], today: NaiveDate) -> Vec<DailySeriesPoint> {
    let changes: Vec<(NaiveDate, f64)> =
        records.iter().map(|r| (r.interval.start_date, r.min_distance_m)).collect();
    let changes = close_at_present(&changes, today, |change, date| change.0 = date);

    // later rows win on a shared date
    let known: BTreeMap<NaiveDate, f64> = changes.into_iter().collect();

    let (Some((&first, &first_value)), Some((&last, _))) =
        (known.first_key_value(), known.last_key_value())
    else {
        return Vec::new();
    };

    let mut current = first_value;
    first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| {
            if let Some(&value) = known.get(&day) {
                current = value;
            }
            DailySeriesPoint { date: day, distance_m: current }
        })
        .collect()
}
