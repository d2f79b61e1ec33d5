//! Error kinds raised by the proximity engine
//!
//! Record-level errors (`UnresolvedLocation`, `InvalidCoordinate`) are recovered
//! by the engine, which drops the affected interval. Everything else aborts the run.

use thiserror::Error;

/// Result type for proximity engine operations
pub type Result<T> = std::result::Result<T, ProximityError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProximityError {
    /// Empty input, or start dates that are not strictly increasing
    #[error("invalid timeline: {0}")]
    InvalidTimeline(String),

    /// Location key missing from the location table
    #[error("unresolved location: {0}")]
    UnresolvedLocation(String),

    /// Non-finite latitude or longitude
    #[error("invalid coordinate: latitude={latitude}, longitude={longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// Reference line has no vertices
    #[error("reference line has no vertices: {0}")]
    EmptyReferenceLine(String),

    /// Feature identifier unknown to the reference-line provider
    #[error("reference line not found: {0}")]
    ReferenceLineNotFound(String),

    /// Every interval was dropped during resolution
    #[error("no residence could be located ({dropped} dropped)")]
    NoResolvedLocations { dropped: usize },

    /// Total lived duration is zero days, so the weighted mean is undefined
    #[error("insufficient data: total duration is zero days")]
    ZeroDuration,
}

impl ProximityError {
    /// Stable machine-readable code, used for log fields, metric labels and API bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ProximityError::InvalidTimeline(_) => "invalid_timeline",
            ProximityError::UnresolvedLocation(_) => "unresolved_location",
            ProximityError::InvalidCoordinate { .. } => "invalid_coordinate",
            ProximityError::EmptyReferenceLine(_) => "empty_reference_line",
            ProximityError::ReferenceLineNotFound(_) => "reference_line_not_found",
            ProximityError::NoResolvedLocations { .. } => "no_resolved_locations",
            ProximityError::ZeroDuration => "insufficient_data",
        }
    }

    /// True for errors that only invalidate a single record
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            ProximityError::UnresolvedLocation(_) | ProximityError::InvalidCoordinate { .. }
        )
    }
}
