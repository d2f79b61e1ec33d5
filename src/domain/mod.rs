//! Domain models - core data types and error kinds
//!
//! This module contains the canonical data types used throughout the system:
//! - `ResidenceEntry` / `ResidenceInterval` - raw input rows and the derived timeline
//! - `GeoPoint` / `ReferenceLine` - coordinates and the measured-against feature
//! - `ProximityRecord` / `SummaryStats` / `DailySeriesPoint` - engine outputs
//! - `ProximityError` - every failure the engine can report

pub mod error;
pub mod types;

// Re-export commonly used types at module level
pub use error::{ProximityError, Result};
pub use types::{
    DailySeriesPoint, DroppedInterval, GeoPoint, ProximityRecord, ProximityReport, ReferenceLine,
    ResidenceEntry, ResidenceInterval, SummaryStats,
};
pub use types::new_run_id;
