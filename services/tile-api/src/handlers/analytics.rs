//! Analytics endpoints, one per algorithm.
//!
//! Every scoped operation fetches its candidates through the feature
//! store's stable ordering with the sample cap applied, and reports
//! `sample_limit`/`is_sample` in the response. Distance is the one
//! exception: it takes two explicit points and no scope.

use std::sync::Arc;

use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use analytics::{
    area_stats, calculate_distance, cluster_features, density_grid, nearest_neighbors,
    ring_query, KM_PER_DEGREE, SAMPLE_LIMIT,
};
use storage::FeatureQuery;
use tile_common::{BoundingBox, Feature, TileError};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::validation::{parse_uuid, PointParam};

/// Optional scope shared by all candidate-based requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeParams {
    pub tileset_id: Option<String>,
    pub layer: Option<String>,
}

impl ScopeParams {
    fn tileset_uuid(&self) -> Result<Option<Uuid>, TileError> {
        self.tileset_id
            .as_deref()
            .map(|raw| parse_uuid(raw, "tileset_id"))
            .transpose()
    }
}

/// Fetch the candidate features for a bbox scope, capped at the
/// sample limit. A full page flags the result as a sample.
async fn scoped_features(
    state: &AppState,
    bbox: BoundingBox,
    scope: &ScopeParams,
) -> Result<(Vec<Feature>, bool), TileError> {
    let query = FeatureQuery {
        bbox: Some(bbox),
        layer: scope.layer.clone(),
        property_filter: None,
        tileset_id: scope.tileset_uuid()?,
        limit: SAMPLE_LIMIT,
    };
    let features = state.features.query(&query).await?;
    let is_sample = features.len() >= SAMPLE_LIMIT;
    Ok((features, is_sample))
}

/// Attach the sampling fields every analytics response carries.
fn sampled(result: impl serde::Serialize, is_sample: bool) -> ApiResult<Json<Value>> {
    let mut value = serde_json::to_value(result)
        .map_err(|e| TileError::Internal(format!("serialization failed: {}", e)))?;
    value["sample_limit"] = json!(SAMPLE_LIMIT);
    value["is_sample"] = json!(is_sample);
    Ok(Json(value))
}

fn bbox_from_array(bbox: [f64; 4]) -> Result<BoundingBox, TileError> {
    let parsed = BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]);
    parsed.validate()?;
    Ok(parsed)
}

/// Scope bbox for a radius query: the coarse degree-delta box around
/// the center, widened on the longitude axis by latitude.
fn radius_bbox(center: [f64; 2], radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / KM_PER_DEGREE;
    let lon_delta = radius_km / (KM_PER_DEGREE * center[1].to_radians().cos().max(0.01));
    BoundingBox::new(
        (center[0] - lon_delta).max(-180.0),
        (center[1] - lat_delta).max(-90.0),
        (center[0] + lon_delta).min(180.0),
        (center[1] + lat_delta).min(90.0),
    )
}

// ============================================================================
// Distance & Bearing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DistanceRequest {
    pub from: PointParam,
    pub to: PointParam,
}

pub async fn distance_handler(
    Json(request): Json<DistanceRequest>,
) -> ApiResult<Json<Value>> {
    let from = request.from.position()?;
    let to = request.to.position()?;
    let result = calculate_distance(from, to);
    Ok(Json(serde_json::to_value(result).map_err(|e| {
        TileError::Internal(format!("serialization failed: {}", e))
    })?))
}

// ============================================================================
// Nearest Neighbors
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NearestRequest {
    pub center: PointParam,
    pub radius_km: f64,
    pub limit: Option<usize>,
    #[serde(flatten)]
    pub scope: ScopeParams,
}

pub async fn nearest_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<NearestRequest>,
) -> ApiResult<Json<Value>> {
    let center = request.center.position()?;
    if !request.radius_km.is_finite() || request.radius_km <= 0.0 {
        return Err(TileError::InvalidParameter {
            param: "radius_km".into(),
            message: "radius must be positive".into(),
        }
        .into());
    }

    let scope_bbox = radius_bbox(center, request.radius_km);
    let (features, is_sample) = scoped_features(&state, scope_bbox, &request.scope).await?;

    let neighbors = nearest_neighbors(
        &features,
        center,
        request.radius_km,
        request.limit.unwrap_or(25),
    )?;

    sampled(
        json!({
            "center": { "lat": request.center.lat, "lon": request.center.lon },
            "radius_km": request.radius_km,
            "count": neighbors.len(),
            "neighbors": neighbors,
        }),
        is_sample,
    )
}

// ============================================================================
// Density Grid
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DensityRequest {
    pub bbox: [f64; 4],
    pub grid_size: Option<usize>,
    pub top_k: Option<usize>,
    #[serde(flatten)]
    pub scope: ScopeParams,
}

pub async fn density_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<DensityRequest>,
) -> ApiResult<Json<Value>> {
    let bbox = bbox_from_array(request.bbox)?;
    let (features, is_sample) = scoped_features(&state, bbox, &request.scope).await?;

    let grid = density_grid(
        &features,
        bbox,
        request.grid_size.unwrap_or(analytics::density::DEFAULT_GRID_SIZE),
        request.top_k.unwrap_or(3),
    )?;

    sampled(grid, is_sample)
}

// ============================================================================
// Clustering
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ClustersRequest {
    pub bbox: [f64; 4],
    pub threshold_km: f64,
    pub top_k: Option<usize>,
    #[serde(flatten)]
    pub scope: ScopeParams,
}

pub async fn clusters_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ClustersRequest>,
) -> ApiResult<Json<Value>> {
    let bbox = bbox_from_array(request.bbox)?;
    let (features, is_sample) = scoped_features(&state, bbox, &request.scope).await?;

    let summary = cluster_features(&features, request.threshold_km, request.top_k.unwrap_or(5))?;
    sampled(summary, is_sample)
}

// ============================================================================
// Ring Buffer Zone
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RingRequest {
    pub center: PointParam,
    pub inner_radius_km: f64,
    pub outer_radius_km: f64,
    #[serde(flatten)]
    pub scope: ScopeParams,
}

pub async fn ring_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<RingRequest>,
) -> ApiResult<Json<Value>> {
    let center = request.center.position()?;
    if request.inner_radius_km >= request.outer_radius_km {
        return Err(TileError::InvalidRadii(format!(
            "inner radius {} must be less than outer radius {}",
            request.inner_radius_km, request.outer_radius_km
        ))
        .into());
    }

    let scope_bbox = radius_bbox(center, request.outer_radius_km);
    let (features, is_sample) = scoped_features(&state, scope_bbox, &request.scope).await?;

    let result = ring_query(
        &features,
        center,
        request.inner_radius_km,
        request.outer_radius_km,
    )?;
    sampled(result, is_sample)
}

// ============================================================================
// Area Stats
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AreaRequest {
    pub bbox: [f64; 4],
    #[serde(flatten)]
    pub scope: ScopeParams,
}

pub async fn area_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<AreaRequest>,
) -> ApiResult<Json<Value>> {
    let bbox = bbox_from_array(request.bbox)?;
    let (features, is_sample) = scoped_features(&state, bbox, &request.scope).await?;

    let stats = area_stats(&features, bbox)?;
    sampled(stats, is_sample)
}
