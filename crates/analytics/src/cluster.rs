//! Single-pass threshold clustering.
//!
//! A feature joins the first existing cluster containing any member
//! within the distance threshold, else it founds a new cluster. The
//! result depends on input order; inputs arrive in the store's stable
//! ordering, which makes the output reproducible, and the outputs are
//! advisory statistics rather than stable groupings. A spatial-index
//! implementation could replace this behind the same signature.

use serde::Serialize;
use uuid::Uuid;

use tile_common::{Feature, TileError, TileResult};

use crate::distance::haversine_km;

/// A cluster's reported summary.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub centroid: [f64; 2],
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub threshold_km: f64,
    pub cluster_count: usize,
    /// Clusters with exactly one member.
    pub isolated_count: usize,
    /// Largest clusters, descending by size.
    pub top_clusters: Vec<Cluster>,
}

struct Group {
    members: Vec<[f64; 2]>,
    ids: Vec<Uuid>,
}

/// Cluster features by representative point. Every feature ends up
/// in exactly one cluster (singletons count as isolated).
pub fn cluster_features(
    features: &[Feature],
    threshold_km: f64,
    top_k: usize,
) -> TileResult<ClusterSummary> {
    if !threshold_km.is_finite() || threshold_km <= 0.0 {
        return Err(TileError::InvalidParameter {
            param: "threshold_km".into(),
            message: "threshold must be positive".into(),
        });
    }

    let mut groups: Vec<Group> = Vec::new();

    for feature in features {
        let point = feature.geometry.representative_point();

        let joined = groups.iter_mut().find(|group| {
            group
                .members
                .iter()
                .any(|member| haversine_km(point, *member) <= threshold_km)
        });

        match joined {
            Some(group) => {
                group.members.push(point);
                group.ids.push(feature.id);
            }
            None => groups.push(Group {
                members: vec![point],
                ids: vec![feature.id],
            }),
        }
    }

    let isolated_count = groups.iter().filter(|g| g.members.len() == 1).count();

    let mut top_clusters: Vec<Cluster> = groups
        .iter()
        .map(|group| {
            let n = group.members.len() as f64;
            let centroid = [
                group.members.iter().map(|m| m[0]).sum::<f64>() / n,
                group.members.iter().map(|m| m[1]).sum::<f64>() / n,
            ];
            Cluster {
                centroid,
                size: group.members.len(),
            }
        })
        .collect();
    top_clusters.sort_by(|a, b| b.size.cmp(&a.size));
    top_clusters.truncate(top_k);

    Ok(ClusterSummary {
        threshold_km,
        cluster_count: groups.len(),
        isolated_count,
        top_clusters,
    })
}
