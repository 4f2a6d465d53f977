//! Feature search: bbox/layer/property-filtered GeoJSON.

use std::sync::Arc;

use axum::{extract::Query, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use storage::FeatureQuery;
use tile_common::{BoundingBox, Feature};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::validation::parse_uuid;

/// Default page size when the caller does not ask for one.
const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub bbox: Option<String>,
    pub layer: Option<String>,
    /// Single `key=value` equality filter.
    pub filter: Option<String>,
    pub limit: Option<usize>,
    pub tileset_id: Option<String>,
}

pub async fn search_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Value>> {
    let query = build_feature_query(&params)?;
    let features = state.features.query(&query).await?;
    Ok(Json(feature_collection(&query, &features)))
}

/// Validate the raw parameters into a feature query. All rejection
/// happens here, before the database is touched.
pub fn build_feature_query(params: &SearchParams) -> Result<FeatureQuery, tile_common::TileError> {
    let bbox = params
        .bbox
        .as_deref()
        .map(BoundingBox::from_param)
        .transpose()?;

    let property_filter = params
        .filter
        .as_deref()
        .map(FeatureQuery::parse_property_filter)
        .transpose()?;

    let tileset_id = params
        .tileset_id
        .as_deref()
        .map(|raw| parse_uuid(raw, "tileset_id"))
        .transpose()?;

    Ok(FeatureQuery {
        bbox,
        layer: params.layer.clone(),
        property_filter,
        tileset_id,
        limit: params.limit.unwrap_or(DEFAULT_LIMIT),
    })
}

/// The canonical response shape: a tagged collection with an explicit
/// count and the resolved query echoed back.
pub fn feature_collection(query: &FeatureQuery, features: &[Feature]) -> Value {
    let mut echoed = json!({
        "limit": query.effective_limit(),
    });
    if let Some(bbox) = &query.bbox {
        echoed["bbox"] = json!(bbox.to_array());
    }
    if let Some(layer) = &query.layer {
        echoed["layer"] = json!(layer);
    }
    if let Some((key, value)) = &query.property_filter {
        echoed["filter"] = json!(format!("{}={}", key, value));
    }
    if let Some(tileset_id) = &query.tileset_id {
        echoed["tileset_id"] = json!(tileset_id.to_string());
    }

    json!({
        "type": "FeatureCollection",
        "features": features.iter().map(|f| f.to_geojson()).collect::<Vec<_>>(),
        "query": echoed,
        "count": features.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tile_common::Geometry;
    use uuid::Uuid;

    fn params() -> SearchParams {
        SearchParams {
            bbox: Some("139.5,35.5,140.0,36.0".into()),
            layer: Some("stations".into()),
            filter: Some("line=yamanote".into()),
            limit: Some(25),
            tileset_id: Some(Uuid::nil().to_string()),
        }
    }

    #[test]
    fn test_build_query() {
        let query = build_feature_query(&params()).unwrap();
        assert!(query.bbox.is_some());
        assert_eq!(query.layer.as_deref(), Some("stations"));
        assert_eq!(
            query.property_filter,
            Some(("line".into(), "yamanote".into()))
        );
        assert_eq!(query.limit, 25);
    }

    #[test]
    fn test_inverted_bbox_rejected() {
        let mut bad = params();
        bad.bbox = Some("140.0,35.5,139.5,36.0".into());
        assert!(build_feature_query(&bad).is_err());
    }

    #[test]
    fn test_malformed_filter_rejected() {
        let mut bad = params();
        bad.filter = Some("noequals".into());
        assert!(build_feature_query(&bad).is_err());
    }

    #[test]
    fn test_collection_shape() {
        let query = build_feature_query(&params()).unwrap();
        let feature = Feature {
            id: Uuid::nil(),
            tileset_id: Uuid::nil(),
            layer: "stations".into(),
            geometry: Geometry::Point([139.7, 35.7]),
            properties: Map::new(),
        };

        let doc = feature_collection(&query, &[feature]);
        assert_eq!(doc["type"], "FeatureCollection");
        assert_eq!(doc["count"], 1);
        assert_eq!(doc["features"][0]["geometry"]["type"], "Point");
        assert_eq!(doc["query"]["layer"], "stations");
        assert_eq!(doc["query"]["filter"], "line=yamanote");
    }
}
