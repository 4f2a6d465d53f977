//! Nearest-neighbor search around a center point.

use serde::Serialize;
use uuid::Uuid;

use tile_common::{Feature, TileError, TileResult};

use crate::distance::haversine_km;
use crate::KM_PER_DEGREE;

/// A feature with its distance from the query center.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    pub feature_id: Uuid,
    pub layer: String,
    pub location: [f64; 2],
    pub distance_km: f64,
}

/// Features within `radius_km` of `center`, ascending by distance,
/// truncated to `limit`.
///
/// Candidates are first prefiltered with a coarse degree-delta box
/// (radius / 111.32, widened on the longitude axis by latitude), then
/// measured exactly with the haversine formula.
pub fn nearest_neighbors(
    features: &[Feature],
    center: [f64; 2],
    radius_km: f64,
    limit: usize,
) -> TileResult<Vec<Neighbor>> {
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(TileError::InvalidParameter {
            param: "radius_km".into(),
            message: "radius must be positive".into(),
        });
    }

    let lat_delta = radius_km / KM_PER_DEGREE;
    // Longitude degrees shrink with latitude; clamp the cosine so the
    // prefilter stays finite near the poles.
    let lon_delta = radius_km / (KM_PER_DEGREE * center[1].to_radians().cos().max(0.01));

    let mut neighbors: Vec<Neighbor> = features
        .iter()
        .filter_map(|feature| {
            let point = feature.geometry.representative_point();
            // Coarse bbox prefilter before the exact distance
            if (point[1] - center[1]).abs() > lat_delta
                || (point[0] - center[0]).abs() > lon_delta
            {
                return None;
            }
            let distance_km = haversine_km(center, point);
            if distance_km > radius_km {
                return None;
            }
            Some(Neighbor {
                feature_id: feature.id,
                layer: feature.layer.clone(),
                location: point,
                distance_km,
            })
        })
        .collect();

    neighbors.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.feature_id.cmp(&b.feature_id))
    });
    neighbors.truncate(limit);

    Ok(neighbors)
}
