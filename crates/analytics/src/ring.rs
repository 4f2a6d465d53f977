//! Ring-buffer (annulus) zone query.

use std::f64::consts::PI;

use serde::Serialize;

use tile_common::{Feature, TileError, TileResult};

use crate::distance::haversine_km;
use crate::nearest::Neighbor;

/// Features inside the annulus plus its area and density.
#[derive(Debug, Clone, Serialize)]
pub struct RingResult {
    pub inner_radius_km: f64,
    pub outer_radius_km: f64,
    pub count: u64,
    /// Circular-annulus area, pi * (outer^2 - inner^2).
    pub area_km2: f64,
    pub density_per_km2: f64,
    pub features: Vec<Neighbor>,
}

/// Features whose haversine distance from `center` lies in
/// `[inner_radius_km, outer_radius_km)`, ascending by distance.
pub fn ring_query(
    features: &[Feature],
    center: [f64; 2],
    inner_radius_km: f64,
    outer_radius_km: f64,
) -> TileResult<RingResult> {
    if !inner_radius_km.is_finite() || !outer_radius_km.is_finite() || inner_radius_km < 0.0 {
        return Err(TileError::InvalidRadii(
            "radii must be finite and non-negative".into(),
        ));
    }
    if inner_radius_km >= outer_radius_km {
        return Err(TileError::InvalidRadii(format!(
            "inner radius {} must be less than outer radius {}",
            inner_radius_km, outer_radius_km
        )));
    }

    let mut matched: Vec<Neighbor> = features
        .iter()
        .filter_map(|feature| {
            let point = feature.geometry.representative_point();
            let distance_km = haversine_km(center, point);
            if distance_km >= inner_radius_km && distance_km < outer_radius_km {
                Some(Neighbor {
                    feature_id: feature.id,
                    layer: feature.layer.clone(),
                    location: point,
                    distance_km,
                })
            } else {
                None
            }
        })
        .collect();

    matched.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.feature_id.cmp(&b.feature_id))
    });

    let area_km2 = PI * (outer_radius_km.powi(2) - inner_radius_km.powi(2));
    let count = matched.len() as u64;

    Ok(RingResult {
        inner_radius_km,
        outer_radius_km,
        count,
        area_km2,
        density_per_km2: count as f64 / area_km2,
        features: matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nearest::nearest_neighbors;
    use crate::testutil::point;

    #[test]
    fn test_annulus_membership_is_half_open() {
        let center = [139.0, 36.0];
        let features = vec![
            point(1, 139.0, 36.0),               // 0 km: excluded when inner > 0
            point(2, 139.0, 36.0 + 5.0 / 111.195), // ~5 km
            point(3, 139.0, 36.0 + 15.0 / 111.195), // ~15 km: outside outer 10
        ];

        let result = ring_query(&features, center, 1.0, 10.0).unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(result.features[0].feature_id, features[1].id);
    }

    #[test]
    fn test_annulus_area_and_density() {
        let result = ring_query(&[], [0.0, 0.0], 0.0, 10.0).unwrap();
        assert!((result.area_km2 - PI * 100.0).abs() < 1e-9);
        assert_eq!(result.count, 0);
        assert_eq!(result.density_per_km2, 0.0);
    }

    #[test]
    fn test_invalid_radii() {
        assert!(matches!(
            ring_query(&[], [0.0, 0.0], 10.0, 10.0),
            Err(TileError::InvalidRadii(_))
        ));
        assert!(matches!(
            ring_query(&[], [0.0, 0.0], 12.0, 10.0),
            Err(TileError::InvalidRadii(_))
        ));
        assert!(ring_query(&[], [0.0, 0.0], -1.0, 10.0).is_err());
    }

    #[test]
    fn test_ring_from_zero_matches_nearest() {
        // Ring [0, R) and nearest-neighbor with radius R agree on the
        // feature set over the same scope.
        let center = [139.7671, 35.6812];
        let features: Vec<_> = (0..30)
            .map(|i| {
                point(
                    i,
                    139.70 + (i as f64) * 0.005,
                    35.65 + ((i % 7) as f64) * 0.01,
                )
            })
            .collect();

        let ring = ring_query(&features, center, 0.0, 8.0).unwrap();
        let nearest = nearest_neighbors(&features, center, 8.0, usize::MAX).unwrap();

        let ring_ids: Vec<_> = ring.features.iter().map(|n| n.feature_id).collect();
        let nearest_ids: Vec<_> = nearest.iter().map(|n| n.feature_id).collect();
        assert_eq!(ring_ids, nearest_ids);
    }
}
