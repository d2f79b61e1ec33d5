//! Services - the proximity pipeline
//!
//! This module contains the core computation, leaf stages first:
//! - `timeline` - Residence entries to closed intervals
//! - `resolver` - Location key to coordinate lookup
//! - `geodesic` - Point to reference-line distance (ellipsoidal or spherical)
//! - `aggregator` - Time-weighted mean, min and max
//! - `daily_series` - One forward-filled value per calendar day
//! - `engine` - Runs the stages above for one timeline

pub mod aggregator;
pub mod daily_series;
pub mod engine;
pub mod geodesic;
pub mod resolver;
pub mod timeline;

// Re-export commonly used types
pub use engine::{compute_proximity, ProximityEngine};
pub use geodesic::{DistanceMode, DistanceModel, DistanceSettings};
pub use resolver::{normalize_location_key, LocationLookup};
