//! Location resolver - maps location keys to coordinates

use crate::domain::{GeoPoint, ProximityError, Result};
use rustc_hash::FxHashMap;

/// Read-only key to coordinate table, shared across runs
pub trait LocationLookup: Send + Sync {
    /// Look up an already-normalized key
    fn lookup(&self, normalized_key: &str) -> Option<GeoPoint>;
}

impl LocationLookup for FxHashMap<String, GeoPoint> {
    fn lookup(&self, normalized_key: &str) -> Option<GeoPoint> {
        self.get(normalized_key).copied()
    }
}

/// Canonical key form: no whitespace, upper case ("sw1a 1aa" -> "SW1A1AA")
pub fn normalize_location_key(key: &str) -> String {
    key.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_uppercase).collect()
}

/// Resolve a raw key against the table.
///
/// Fails with `UnresolvedLocation` on a miss and `InvalidCoordinate` when the
/// table holds a non-finite coordinate for the key.
pub fn resolve_location<L: LocationLookup + ?Sized>(table: &L, key: &str) -> Result<GeoPoint> {
    let normalized = normalize_location_key(key);
    let point = table
        .lookup(&normalized)
        .ok_or_else(|| ProximityError::UnresolvedLocation(key.to_string()))?;
    point.validate()?;
    Ok(point)
}
