//! Area statistics for a query bounding box.

use std::collections::BTreeMap;

use serde::Serialize;

use tile_common::{BoundingBox, Feature, TileResult};

use crate::KM_PER_DEGREE;

#[derive(Debug, Clone, Serialize)]
pub struct DensityInfo {
    pub features_per_km2: f64,
}

/// Bbox area, feature count and density, with a per-layer breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct AreaStats {
    pub area_km2: f64,
    pub feature_count: u64,
    pub density: DensityInfo,
    pub layers: BTreeMap<String, u64>,
}

/// Approximate bbox area: the longitude span is scaled by the cosine
/// of the mid-latitude.
pub fn bbox_area_km2(bbox: &BoundingBox) -> f64 {
    let mid_lat = (bbox.min_y + bbox.max_y) / 2.0;
    let width_km = bbox.width() * KM_PER_DEGREE * mid_lat.to_radians().cos();
    let height_km = bbox.height() * KM_PER_DEGREE;
    width_km * height_km
}

pub fn area_stats(features: &[Feature], bbox: BoundingBox) -> TileResult<AreaStats> {
    bbox.validate()?;

    let area_km2 = bbox_area_km2(&bbox);

    let mut layers: BTreeMap<String, u64> = BTreeMap::new();
    for feature in features {
        *layers.entry(feature.layer.clone()).or_insert(0) += 1;
    }

    let feature_count = features.len() as u64;
    let features_per_km2 = if area_km2 > 0.0 {
        feature_count as f64 / area_km2
    } else {
        0.0
    };

    Ok(AreaStats {
        area_km2,
        feature_count,
        density: DensityInfo { features_per_km2 },
        layers,
    })
}
