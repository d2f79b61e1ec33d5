//! Shared data types for the residence proximity engine

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{ProximityError, Result};

/// One row of raw input: where someone lived and when they moved in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidenceEntry {
    #[serde(alias = "postcode")]
    pub location_key: String,
    #[serde(alias = "from")]
    pub start_date: NaiveDate,
}

impl ResidenceEntry {
    pub fn new(location_key: impl Into<String>, start_date: NaiveDate) -> Self {
        Self { location_key: location_key.into(), start_date }
    }
}

/// Closed-open span `[start_date, end_date)` spent at one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResidenceInterval {
    pub location_key: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: i64,
}

/// Unprojected WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Reject NaN and infinite coordinates
    pub fn validate(&self) -> Result<()> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(ProximityError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

/// The feature being measured against, as one or more line strings.
///
/// Parts are never joined to each other: the last vertex of one part and the
/// first vertex of the next do not form a segment.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLine {
    name: String,
    parts: Vec<Vec<GeoPoint>>,
}

impl ReferenceLine {
    /// Single-part line
    pub fn new(name: impl Into<String>, vertices: Vec<GeoPoint>) -> Self {
        Self::from_parts(name, vec![vertices])
    }

    /// Multi-part line, empty parts are discarded
    pub fn from_parts(name: impl Into<String>, parts: Vec<Vec<GeoPoint>>) -> Self {
        let parts = parts.into_iter().filter(|p| !p.is_empty()).collect();
        Self { name: name.into(), parts }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parts(&self) -> &[Vec<GeoPoint>] {
        &self.parts
    }

    /// All vertices of all parts, in order
    pub fn vertices(&self) -> impl Iterator<Item = &GeoPoint> {
        self.parts.iter().flatten()
    }

    /// Consecutive vertex pairs within each part
    pub fn segments(&self) -> impl Iterator<Item = (&GeoPoint, &GeoPoint)> {
        self.parts.iter().flat_map(|part| part.windows(2).map(|w| (&w[0], &w[1])))
    }

    pub fn vertex_count(&self) -> usize {
        self.parts.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// A usable line has at least one vertex and only finite coordinates
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ProximityError::EmptyReferenceLine(self.name.clone()));
        }
        self.vertices().try_for_each(GeoPoint::validate)
    }
}

/// A resolved interval with its distance to the reference line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityRecord {
    pub interval: ResidenceInterval,
    pub point: GeoPoint,
    pub min_distance_m: f64,
    pub weighted_distance_day_m: f64,
}

impl ProximityRecord {
    pub fn new(interval: ResidenceInterval, point: GeoPoint, min_distance_m: f64) -> Self {
        let weighted_distance_day_m = min_distance_m * interval.duration_days as f64;
        Self { interval, point, min_distance_m, weighted_distance_day_m }
    }
}

/// Time-weighted distance statistics over one run, in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    pub mean_m: f64,
    pub min_m: f64,
    pub max_m: f64,
}

impl SummaryStats {
    /// Divide every value by `factor` (1000.0 gives kilometers)
    pub fn scaled(&self, factor: f64) -> Self {
        Self { mean_m: self.mean_m / factor, min_m: self.min_m / factor, max_m: self.max_m / factor }
    }
}

/// Distance in effect on one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailySeriesPoint {
    pub date: NaiveDate,
    pub distance_m: f64,
}

impl DailySeriesPoint {
    pub fn scaled(&self, factor: f64) -> Self {
        Self { date: self.date, distance_m: self.distance_m / factor }
    }
}

/// New time-sortable run identifier (UUIDv7)
pub fn new_run_id() -> String {
    Uuid::now_v7().to_string()
}

/// Interval excluded from a run, with the error kind that excluded it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedInterval {
    pub location_key: String,
    pub start_date: NaiveDate,
    pub reason: &'static str,
}

/// Everything one run produces
#[derive(Debug, Clone, Serialize)]
pub struct ProximityReport {
    pub run_id: String,
    pub feature: String,
    pub today: NaiveDate,
    pub intervals: Vec<ResidenceInterval>,
    pub records: Vec<ProximityRecord>,
    pub dropped: Vec<DroppedInterval>,
    pub stats: SummaryStats,
    pub daily: Vec<DailySeriesPoint>,
}

impl ProximityReport {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    /// Copy with stats and daily series divided by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        let mut report = self.clone();
        report.stats = self.stats.scaled(factor);
        report.daily = self.daily.iter().map(|p| p.scaled(factor)).collect();
        report
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
