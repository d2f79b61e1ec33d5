//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `postcodes` - Location table loaded from CSV
//! - `roads` - Reference-line catalog loaded from GeoJSON files
//! - `egress` - Report output to file (JSONL format)
//! - `http` - HTTP API (roads, proximity runs, health, metrics)
//! - `prometheus` - Prometheus text format for `/metrics`

pub mod egress;
pub mod http;
pub mod postcodes;
pub mod prometheus;
pub mod roads;

// Re-export commonly used types
pub use egress::ReportEgress;
pub use http::{start_api_server, ApiState};
pub use postcodes::PostcodeTable;
pub use roads::{FeatureInfo, ReferenceLineProvider, RoadCatalog};
