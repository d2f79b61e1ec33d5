//! Proximity engine - runs the whole pipeline for one timeline
//!
//! entries -> timeline -> resolved points -> distances -> stats + daily series
//!
//! Reference geometry and the location table are shared read-only inputs;
//! everything derived during a run is owned by that run.

use crate::domain::{
    new_run_id, DroppedInterval, ProximityError, ProximityRecord, ProximityReport, ReferenceLine,
    ResidenceEntry, ResidenceInterval, Result,
};
use crate::infra::metrics::Metrics;
use crate::io::roads::{FeatureInfo, ReferenceLineProvider};
use crate::services::aggregator::summarize;
use crate::services::daily_series::daily_series;
use crate::services::geodesic::{distance_to_validated_line, DistanceSettings};
use crate::services::resolver::{resolve_location, LocationLookup};
use crate::services::timeline::build_timeline;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Compute a full report against an already-loaded reference line.
///
/// Intervals whose location cannot be resolved (or resolves to a non-finite
/// coordinate) are dropped and listed in `ProximityReport::dropped`. The run
/// fails if the timeline is invalid, the line is unusable, no interval
/// survives, or the surviving intervals add up to zero days.
pub fn compute_proximity<L: LocationLookup + ?Sized>(
    entries: &[ResidenceEntry],
    line: &ReferenceLine,
    locations: &L,
    settings: DistanceSettings,
    today: NaiveDate,
) -> Result<ProximityReport> {
    let intervals = build_timeline(entries, today)?;
    line.validate()?;

    let mut records = Vec::with_capacity(intervals.len());
    let mut dropped = Vec::new();
    for interval in &intervals {
        match locate(interval, line, locations, settings) {
            Ok(record) => records.push(record),
            Err(e) if e.is_record_level() => {
                warn!(
                    location_key = %interval.location_key,
                    start_date = %interval.start_date,
                    reason = %e.kind(),
                    "interval_dropped"
                );
                dropped.push(DroppedInterval {
                    location_key: interval.location_key.clone(),
                    start_date: interval.start_date,
                    reason: e.kind(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    if records.is_empty() {
        return Err(ProximityError::NoResolvedLocations { dropped: dropped.len() });
    }

    let stats = summarize(&records)?;
    let daily = daily_series(&records, today);

    Ok(ProximityReport {
        run_id: new_run_id(),
        feature: line.name().to_string(),
        today,
        intervals,
        records,
        dropped,
        stats,
        daily,
    })
}

fn locate<L: LocationLookup + ?Sized>(
    interval: &ResidenceInterval,
    line: &ReferenceLine,
    locations: &L,
    settings: DistanceSettings,
) -> Result<ProximityRecord> {
    let point = resolve_location(locations, &interval.location_key)?;
    let distance = distance_to_validated_line(&point, line, settings);
    debug!(
        location_key = %interval.location_key,
        duration_days = %interval.duration_days,
        min_distance_m = format!("{distance:.1}"),
        "interval_located"
    );
    Ok(ProximityRecord::new(interval.clone(), point, distance))
}

/// Location table plus reference-line provider, shared by every run
pub struct ProximityEngine {
    locations: Arc<dyn LocationLookup>,
    lines: Arc<dyn ReferenceLineProvider>,
    settings: DistanceSettings,
    metrics: Arc<Metrics>,
}

impl ProximityEngine {
    pub fn new(
        locations: Arc<dyn LocationLookup>,
        lines: Arc<dyn ReferenceLineProvider>,
        settings: DistanceSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { locations, lines, settings, metrics }
    }

    pub fn features(&self) -> Vec<FeatureInfo> {
        self.lines.features()
    }

    /// Run one timeline against the feature `feature`
    pub fn run(
        &self,
        feature: &str,
        entries: &[ResidenceEntry],
        today: NaiveDate,
    ) -> Result<ProximityReport> {
        let started = Instant::now();
        let result = self.lines.reference_line(feature).and_then(|line| {
            compute_proximity(entries, &line, self.locations.as_ref(), self.settings, today)
        });
        let latency_us = started.elapsed().as_micros() as u64;

        match &result {
            Ok(report) => {
                self.metrics.record_run(latency_us, report.records.len(), report.dropped_count());
                info!(
                    run_id = %report.run_id,
                    feature = %feature,
                    intervals = %report.intervals.len(),
                    dropped = %report.dropped_count(),
                    mean_m = format!("{:.1}", report.stats.mean_m),
                    min_m = format!("{:.1}", report.stats.min_m),
                    max_m = format!("{:.1}", report.stats.max_m),
                    latency_us = %latency_us,
                    "proximity_run_completed"
                );
            }
            Err(e) => {
                self.metrics.record_run_failed(latency_us, e.kind());
                warn!(feature = %feature, error = %e, kind = %e.kind(), "proximity_run_failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GeoPoint;
    use crate::io::postcodes::PostcodeTable;
    use crate::io::roads::RoadCatalog;
    use crate::services::geodesic::{DistanceMode, DistanceModel};
    use approx::assert_abs_diff_eq;

    /// Meters per degree of longitude along the equator on WGS84
    const M_PER_DEG_EQUATOR: f64 = 111_319.490_793_273_6;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn equator_line() -> ReferenceLine {
        ReferenceLine::new("Equator", vec![GeoPoint::new(0.0, 0.0)])
    }

    fn table() -> PostcodeTable {
        let mut table = PostcodeTable::new();
        table.insert("AB1", GeoPoint::new(0.0, 500.0 / M_PER_DEG_EQUATOR));
        table.insert("CD2", GeoPoint::new(0.0, -1500.0 / M_PER_DEG_EQUATOR));
        table.insert("NAN1", GeoPoint::new(f64::NAN, 0.0));
        table
    }

    fn two_moves() -> Vec<ResidenceEntry> {
        vec![ResidenceEntry::new("AB1", date(2020, 1, 1)), ResidenceEntry::new("CD2", date(2020, 6, 1))]
    }

    #[test]
    fn test_two_residences() {
        let report = compute_proximity(
            &two_moves(),
            &equator_line(),
            &table(),
            DistanceSettings::default(),
            date(2020, 12, 1),
        )
        .unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.dropped_count(), 0);
        assert_eq!(report.feature, "Equator");
        assert_abs_diff_eq!(report.records[0].min_distance_m, 500.0, epsilon = 1e-3);
        assert_abs_diff_eq!(report.records[1].min_distance_m, 1500.0, epsilon = 1e-3);
        assert_abs_diff_eq!(report.stats.mean_m, 350_500.0 / 335.0, epsilon = 1e-2);
        assert_eq!(report.daily.len(), 336);
    }

    #[test]
    fn test_unresolved_location_dropped() {
        let entries = vec![
            ResidenceEntry::new("ZZ9", date(2020, 1, 1)),
            ResidenceEntry::new("CD2", date(2020, 6, 1)),
        ];
        let report = compute_proximity(
            &entries,
            &equator_line(),
            &table(),
            DistanceSettings::default(),
            date(2020, 12, 1),
        )
        .unwrap();

        assert_eq!(report.dropped_count(), 1);
        assert_eq!(report.dropped[0].reason, "unresolved_location");
        assert_eq!(report.records.len(), 1);
        assert_abs_diff_eq!(report.stats.mean_m, report.stats.min_m, epsilon = 1e-9);
        assert_eq!(report.daily.first().unwrap().date, date(2020, 6, 1));
    }

    #[test]
    fn test_invalid_coordinate_dropped() {
        let entries = vec![
            ResidenceEntry::new("AB1", date(2020, 1, 1)),
            ResidenceEntry::new("NAN 1", date(2020, 6, 1)),
        ];
        let report = compute_proximity(
            &entries,
            &equator_line(),
            &table(),
            DistanceSettings::default(),
            date(2020, 12, 1),
        )
        .unwrap();
        assert_eq!(report.dropped[0].reason, "invalid_coordinate");
        assert!(report.stats.mean_m.is_finite());
    }

    #[test]
    fn test_all_unresolved_is_fatal() {
        let entries = vec![ResidenceEntry::new("ZZ9", date(2020, 1, 1))];
        let err = compute_proximity(
            &entries,
            &equator_line(),
            &table(),
            DistanceSettings::default(),
            date(2020, 12, 1),
        )
        .unwrap_err();
        assert_eq!(err, ProximityError::NoResolvedLocations { dropped: 1 });
    }

    #[test]
    fn test_empty_line_is_fatal_before_resolution() {
        let err = compute_proximity(
            &two_moves(),
            &ReferenceLine::new("Nowhere", vec![]),
            &table(),
            DistanceSettings::default(),
            date(2020, 12, 1),
        )
        .unwrap_err();
        assert_eq!(err, ProximityError::EmptyReferenceLine("Nowhere".to_string()));
    }

    #[test]
    fn test_zero_total_duration() {
        let entries = vec![ResidenceEntry::new("AB1", date(2020, 12, 1))];
        let err = compute_proximity(
            &entries,
            &equator_line(),
            &table(),
            DistanceSettings::default(),
            date(2020, 12, 1),
        )
        .unwrap_err();
        assert_eq!(err, ProximityError::ZeroDuration);
    }

    #[test]
    fn test_deterministic_outputs() {
        let run = || {
            compute_proximity(
                &two_moves(),
                &equator_line(),
                &table(),
                DistanceSettings::default(),
                date(2020, 12, 1),
            )
            .unwrap()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.daily, b.daily);
        assert_eq!(a.records, b.records);
    }

    #[test]
    fn test_engine_run_records_metrics() {
        let mut catalog = RoadCatalog::new();
        catalog.insert("Equator", equator_line());
        let metrics = Arc::new(Metrics::new());
        let engine = ProximityEngine::new(
            Arc::new(table()),
            Arc::new(catalog),
            DistanceSettings { model: DistanceModel::Spherical, mode: DistanceMode::Vertex },
            metrics.clone(),
        );

        assert!(engine.run("Equator", &two_moves(), date(2020, 12, 1)).is_ok());
        let err = engine.run("M25", &two_moves(), date(2020, 12, 1)).unwrap_err();
        assert_eq!(err.kind(), "reference_line_not_found");

        assert_eq!(metrics.runs_total(), 1);
        assert_eq!(metrics.failures_by_kind(), vec![("reference_line_not_found", 1)]);
        assert_eq!(engine.features().len(), 1);
    }
}
