//! Geodesic distance engine
//!
//! Distances are always meters. Two Earth models are supported:
//! - `Ellipsoidal` - WGS84 ellipsoid, Vincenty inverse formula
//! - `Spherical` - haversine on a sphere of radius `EARTH_RADIUS_M`
//!
//! and two ways of measuring distance to a reference line:
//! - `Vertex` - distance to the nearest vertex (reference behaviour)
//! - `Segment` - distance to the nearest point on any great-circle segment
//!
//! `Segment` changes every measured distance (it is never larger than `Vertex`),
//! so it must be selected explicitly.

use crate::domain::{GeoPoint, ReferenceLine, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius for the spherical model
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

const VINCENTY_MAX_ITERATIONS: usize = 200;
const VINCENTY_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceModel {
    #[default]
    Ellipsoidal,
    Spherical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    #[default]
    Vertex,
    Segment,
}

/// How distances are measured for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DistanceSettings {
    pub model: DistanceModel,
    pub mode: DistanceMode,
}

/// Great-circle distance on a sphere of radius `EARTH_RADIUS_M`
pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// WGS84 geodesic distance by Vincenty's inverse formula.
///
/// Returns `None` when the iteration does not converge, which only happens for
/// nearly antipodal points.
pub fn vincenty_m(a: &GeoPoint, b: &GeoPoint) -> Option<f64> {
    let l = (b.longitude - a.longitude).to_radians();
    let u1 = ((1.0 - WGS84_F) * a.latitude.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * b.latitude.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..VINCENTY_MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            // coincident points
            return Some(0.0);
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha = 0
        let cos_2sigma_m =
            if cos_sq_alpha != 0.0 { cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha } else { 0.0 };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));

        let lambda_prev = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))));

        if (lambda - lambda_prev).abs() < VINCENTY_TOLERANCE {
            let u_sq = cos_sq_alpha * (WGS84_A.powi(2) - WGS84_B.powi(2)) / WGS84_B.powi(2);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma.powi(2))
                                * (-3.0 + 4.0 * cos_2sigma_m.powi(2))));
            return Some(WGS84_B * big_a * (sigma - delta_sigma));
        }
    }
    None
}

/// Point-to-point distance under the given model
pub fn point_distance_m(model: DistanceModel, a: &GeoPoint, b: &GeoPoint) -> f64 {
    match model {
        DistanceModel::Spherical => haversine_m(a, b),
        DistanceModel::Ellipsoidal => vincenty_m(a, b).unwrap_or_else(|| haversine_m(a, b)),
    }
}

/// Minimum distance from `point` to `line`.
///
/// O(V) in the number of line vertices. Fails with `EmptyReferenceLine` for a
/// line without vertices and `InvalidCoordinate` for any non-finite input.
pub fn min_distance_to_line(
    point: &GeoPoint,
    line: &ReferenceLine,
    settings: DistanceSettings,
) -> Result<f64> {
    point.validate()?;
    line.validate()?;
    Ok(distance_to_validated_line(point, line, settings))
}

/// `min_distance_to_line` for inputs the caller has already validated
pub(crate) fn distance_to_validated_line(
    point: &GeoPoint,
    line: &ReferenceLine,
    settings: DistanceSettings,
) -> f64 {
    let nearest_vertex = line
        .vertices()
        .map(|v| point_distance_m(settings.model, point, v))
        .fold(f64::INFINITY, f64::min);

    let distance = match settings.mode {
        DistanceMode::Vertex => nearest_vertex,
        DistanceMode::Segment => line
            .segments()
            .filter_map(|(a, b)| closest_point_on_arc(point, a, b))
            .map(|c| point_distance_m(settings.model, point, &c))
            .fold(nearest_vertex, f64::min),
    };

    distance.max(0.0)
}

type Vec3 = [f64; 3];

fn to_unit(p: &GeoPoint) -> Vec3 {
    let (sin_lat, cos_lat) = p.latitude.to_radians().sin_cos();
    let (sin_lon, cos_lon) = p.longitude.to_radians().sin_cos();
    [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat]
}

fn from_unit(v: Vec3) -> GeoPoint {
    let lat = v[2].atan2((v[0] * v[0] + v[1] * v[1]).sqrt());
    let lon = v[1].atan2(v[0]);
    GeoPoint::new(lat.to_degrees(), lon.to_degrees())
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

fn scale(a: Vec3, k: f64) -> Vec3 {
    [a[0] * k, a[1] * k, a[2] * k]
}

/// Foot of the perpendicular from `p` onto the minor arc `a`-`b`.
///
/// `None` when the foot falls outside the arc or the arc is degenerate; the
/// arc endpoints are vertices, so those cases are already covered.
fn closest_point_on_arc(p: &GeoPoint, a: &GeoPoint, b: &GeoPoint) -> Option<GeoPoint> {
    let (pu, au, bu) = (to_unit(p), to_unit(a), to_unit(b));

    let n = cross(au, bu);
    let n_len = norm(n);
    if n_len < 1e-12 {
        return None;
    }
    let n = scale(n, 1.0 / n_len);

    let along = dot(pu, n);
    let c = [pu[0] - along * n[0], pu[1] - along * n[1], pu[2] - along * n[2]];
    let c_len = norm(c);
    if c_len < 1e-12 {
        // p is a pole of the great circle, every arc point is equidistant
        return None;
    }
    let c = scale(c, 1.0 / c_len);

    let inside = dot(cross(au, c), n) >= 0.0 && dot(cross(c, bu), n) >= 0.0;
    inside.then(|| from_unit(c))
}
