//! Geospatial analytics over bounded feature samples.
//!
//! Every operation works on a feature slice already fetched through
//! the geometry store's stable ordering. Cost is bounded by sampling:
//! callers truncate the candidate set to [`SAMPLE_LIMIT`] and surface
//! the truncation with `is_sample` — the tradeoff is deliberate and
//! always visible in responses, never hidden.

pub mod area;
pub mod cluster;
pub mod density;
pub mod distance;
pub mod nearest;
pub mod ring;

pub use area::{area_stats, AreaStats};
pub use cluster::{cluster_features, Cluster, ClusterSummary};
pub use density::{density_grid, DensityGrid, Hotspot};
pub use distance::{bearing_deg, calculate_distance, compass_direction, haversine_km, DistanceResult};
pub use nearest::{nearest_neighbors, Neighbor};
pub use ring::{ring_query, RingResult};

use tile_common::Feature;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Kilometers per degree of latitude (and of longitude at the
/// equator), used for coarse degree-delta prefilters and bbox areas.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Default cap on features analyzed per request.
pub const SAMPLE_LIMIT: usize = 1000;

/// Truncate a candidate set to the sample limit.
///
/// Returns the retained features and whether truncation happened;
/// the flag must be echoed to the caller as `is_sample`.
pub fn apply_sample_limit(mut features: Vec<Feature>, limit: usize) -> (Vec<Feature>, bool) {
    if features.len() > limit {
        features.truncate(limit);
        (features, true)
    } else {
        (features, false)
    }
}
