//! Postcode table - location key to coordinate lookup loaded from CSV
//!
//! The file needs a header row naming `postcode`, `latitude` and `longitude`
//! columns (any order, case-insensitive). Other columns are ignored. Rows whose
//! coordinates do not parse are skipped and counted.

use crate::domain::GeoPoint;
use crate::services::resolver::{normalize_location_key, LocationLookup};
use anyhow::{bail, Context};
use csv::StringRecord;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct PostcodeTable {
    points: FxHashMap<String, GeoPoint>,
    skipped_rows: usize,
}

#[derive(Debug, Deserialize)]
struct PostcodeRow {
    postcode: String,
    latitude: f64,
    longitude: f64,
}

const REQUIRED_COLUMNS: [&str; 3] = ["postcode", "latitude", "longitude"];

impl PostcodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a point; the key is normalized first
    pub fn insert(&mut self, key: &str, point: GeoPoint) {
        self.points.insert(normalize_location_key(key), point);
    }

    /// Parse CSV content
    pub fn parse_csv(content: &str) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers: StringRecord =
            reader.headers().context("unreadable header row")?.iter().map(str::to_ascii_lowercase).collect();
        if headers.is_empty() {
            bail!("postcode table is empty");
        }
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                bail!("missing \"{column}\" column in header");
            }
        }

        let mut table = Self::new();
        for record in reader.records() {
            let row = record
                .ok()
                .and_then(|record| record.deserialize::<PostcodeRow>(Some(&headers)).ok())
                .filter(|row| !row.postcode.is_empty());
            match row {
                Some(row) => table.insert(&row.postcode, GeoPoint::new(row.latitude, row.longitude)),
                None => table.skipped_rows += 1,
            }
        }
        Ok(table)
    }

    /// Load a CSV file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read postcode table {}", path.display()))?;
        let table = Self::parse_csv(&content)
            .with_context(|| format!("Failed to parse postcode table {}", path.display()))?;

        if table.skipped_rows > 0 {
            warn!(file = %path.display(), skipped_rows = %table.skipped_rows, "postcode_rows_skipped");
        }
        info!(file = %path.display(), postcodes = %table.len(), "postcode_table_loaded");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }
}

impl LocationLookup for PostcodeTable {
    fn lookup(&self, normalized_key: &str) -> Option<GeoPoint> {
        self.points.get(normalized_key).copied()
    }
}
