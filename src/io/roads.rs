//! Reference-line catalog loaded from GeoJSON files
//!
//! Each `.geojson` / `.json` file in the roads directory is one selectable
//! feature; the file stem is its identifier (`M25.geojson` -> `M25`). Line
//! strings and multi-line strings are collected into one multi-part
//! `ReferenceLine`; other geometry types are ignored. Coordinates are
//! `[longitude, latitude]` as GeoJSON requires.

use crate::domain::{GeoPoint, ProximityError, ReferenceLine, Result};
use anyhow::{bail, Context};
use geojson::{GeoJson, Position, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of reference geometry, keyed by an opaque feature identifier
pub trait ReferenceLineProvider: Send + Sync {
    /// Fails with `ReferenceLineNotFound` for an unknown identifier
    fn reference_line(&self, feature: &str) -> Result<Arc<ReferenceLine>>;

    /// Selectable features, sorted by identifier
    fn features(&self) -> Vec<FeatureInfo>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureInfo {
    pub id: String,
    pub name: String,
}

/// Human readable feature name ("A1_M" -> "A1 M")
pub fn display_name(id: &str) -> String {
    id.replace('_', " ")
}

/// In-memory catalog, loaded once and shared read-only
#[derive(Debug, Default)]
pub struct RoadCatalog {
    lines: BTreeMap<String, Arc<ReferenceLine>>,
}

impl RoadCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, line: ReferenceLine) {
        self.lines.insert(id.into(), Arc::new(line));
    }

    /// Load every GeoJSON file in `dir`. Unreadable or malformed files are
    /// logged and skipped.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read roads directory {}", dir.display()))?;

        let mut catalog = Self::new();
        let mut skipped = 0usize;
        for entry in entries {
            let path = entry?.path();
            let is_geojson = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"));
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_geojson {
                debug!(file = %path.display(), "road_file_ignored");
                continue;
            }

            let parsed = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))
                .and_then(|content| parse_geojson_line(id, &content));
            match parsed {
                Ok(line) => {
                    debug!(road = %id, vertices = %line.vertex_count(), "road_loaded");
                    catalog.insert(id, line);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %format!("{e:#}"), "road_load_failed");
                    skipped += 1;
                }
            }
        }

        info!(dir = %dir.display(), roads = %catalog.len(), skipped = %skipped, "road_catalog_loaded");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl ReferenceLineProvider for RoadCatalog {
    fn reference_line(&self, feature: &str) -> Result<Arc<ReferenceLine>> {
        self.lines
            .get(feature)
            .cloned()
            .ok_or_else(|| ProximityError::ReferenceLineNotFound(feature.to_string()))
    }

    fn features(&self) -> Vec<FeatureInfo> {
        self.lines.keys().map(|id| FeatureInfo { id: id.clone(), name: display_name(id) }).collect()
    }
}

/// Parse a GeoJSON document into a reference line named `name`
pub fn parse_geojson_line(name: &str, content: &str) -> anyhow::Result<ReferenceLine> {
    let geojson: GeoJson = content.parse().context("invalid GeoJSON")?;

    let mut parts = Vec::new();
    match geojson {
        GeoJson::FeatureCollection(collection) => {
            for feature in collection.features {
                if let Some(geometry) = feature.geometry {
                    collect_parts(geometry.value, &mut parts)?;
                }
            }
        }
        GeoJson::Feature(feature) => {
            if let Some(geometry) = feature.geometry {
                collect_parts(geometry.value, &mut parts)?;
            }
        }
        GeoJson::Geometry(geometry) => collect_parts(geometry.value, &mut parts)?,
    }
    Ok(ReferenceLine::from_parts(display_name(name), parts))
}

fn collect_parts(value: Value, parts: &mut Vec<Vec<GeoPoint>>) -> anyhow::Result<()> {
    match value {
        Value::LineString(line) => parts.push(to_points(&line)?),
        Value::MultiLineString(lines) => {
            for line in &lines {
                parts.push(to_points(line)?);
            }
        }
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_parts(geometry.value, parts)?;
            }
        }
        _ => debug!("non_line_geometry_ignored"),
    }
    Ok(())
}

// GeoJSON positions are [longitude, latitude, (elevation)]
fn to_points(line: &[Position]) -> anyhow::Result<Vec<GeoPoint>> {
    line.iter()
        .map(|position| match position.as_slice() {
            [lon, lat, ..] => Ok(GeoPoint::new(*lat, *lon)),
            _ => bail!("position must hold longitude and latitude: {position:?}"),
        })
        .collect()
}
