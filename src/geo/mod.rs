//! Spherical-earth geometry used to point the finder arrow.
//!
//! All functions are pure. Degenerate inputs return sentinel values rather
//! than NaN so callers never have to guard against poisoned floats.

use serde::{Deserialize, Serialize};

/// Mean earth radius used by the haversine approximation.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Two coordinates closer than this are treated as the same point for bearings.
const COINCIDENT_EPSILON_DEG: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Coord {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lng: f64,
}

impl Coord {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

impl std::str::FromStr for Coord {
    type Err = String;

    /// Parses `"<lat>,<lng>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("expected <lat>,<lng> but got '{}'", s))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|e| format!("invalid latitude '{}': {}", lat, e))?;
        let lng: f64 = lng
            .trim()
            .parse()
            .map_err(|e| format!("invalid longitude '{}': {}", lng, e))?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(format!("coordinate out of range: {},{}", lat, lng));
        }
        Ok(Coord { lat, lng })
    }
}

/// Great-circle distance between two coordinates in meters (haversine).
pub fn distance_meters(a: Coord, b: Coord) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);

    // rounding can push h a hair above 1 for antipodal points
    2.0 * EARTH_RADIUS_M * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Forward azimuth from `from` to `to` in degrees, within `[0, 360)`.
///
/// Returns `None` when the two coordinates coincide and the bearing is undefined.
pub fn initial_bearing_degrees(from: Coord, to: Coord) -> Option<f64> {
    if (from.lat - to.lat).abs() < COINCIDENT_EPSILON_DEG
        && (from.lng - to.lng).abs() < COINCIDENT_EPSILON_DEG
    {
        return None;
    }

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlng = (to.lng - from.lng).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    let bearing = y.atan2(x).to_degrees();
    if bearing.is_nan() {
        return None;
    }
    Some(normalize_bearing(bearing))
}

/// Rotation to apply to an "up" arrow so it points at the target.
///
/// Result is within `[-180, 180)`. Without a compass heading the arrow stays
/// unrotated.
pub fn relative_rotation(target_bearing: f64, device_heading: Option<f64>) -> f64 {
    match device_heading {
        Some(heading) if heading.is_finite() && target_bearing.is_finite() => {
            normalize_signed(target_bearing - heading)
        }
        _ => 0.,
    }
}

/// Coordinate reached by travelling `distance_m` from `origin` along `bearing_deg`.
pub fn offset(origin: Coord, bearing_deg: f64, distance_m: f64) -> Coord {
    let angular = distance_m / EARTH_RADIUS_M;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let lng1 = origin.lng.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lng2 = lng1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Coord {
        lat: lat2.to_degrees(),
        lng: normalize_signed(lng2.to_degrees()),
    }
}

/// Maps any angle onto `[0, 360)`.
pub fn normalize_bearing(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.);
    // rem_euclid can return exactly 360.0 for tiny negative inputs
    if normalized >= 360. { 0. } else { normalized }
}

/// Maps any angle onto `[-180, 180)`.
pub fn normalize_signed(degrees: f64) -> f64 {
    let normalized = (degrees + 180.).rem_euclid(360.) - 180.;
    if normalized >= 180. { -180. } else { normalized }
}
