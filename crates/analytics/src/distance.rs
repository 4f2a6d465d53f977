//! Great-circle distance and bearing.

use serde::Serialize;

use crate::EARTH_RADIUS_KM;

/// The eight compass sectors, 45 degrees each, centered on north.
const COMPASS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Haversine distance in kilometers between two `[lon, lat]` points.
pub fn haversine_km(a: [f64; 2], b: [f64; 2]) -> f64 {
    let lat1 = a[1].to_radians();
    let lat2 = b[1].to_radians();
    let dlat = (b[1] - a[1]).to_radians();
    let dlon = (b[0] - a[0]).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Forward azimuth from `a` to `b`, normalized to [0, 360).
pub fn bearing_deg(a: [f64; 2], b: [f64; 2]) -> f64 {
    let lat1 = a[1].to_radians();
    let lat2 = b[1].to_radians();
    let dlon = (b[0] - a[0]).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Quantize a bearing to the nearest of eight compass points.
pub fn compass_direction(bearing: f64) -> &'static str {
    let sector = (((bearing + 22.5) % 360.0) / 45.0) as usize;
    COMPASS[sector.min(7)]
}

/// Distance plus bearing between two points.
#[derive(Debug, Clone, Serialize)]
pub struct DistanceResult {
    pub distance_km: f64,
    pub bearing_deg: f64,
    pub bearing_direction: &'static str,
}

pub fn calculate_distance(a: [f64; 2], b: [f64; 2]) -> DistanceResult {
    let bearing = bearing_deg(a, b);
    DistanceResult {
        distance_km: haversine_km(a, b),
        bearing_deg: bearing,
        bearing_direction: compass_direction(bearing),
    }
}
