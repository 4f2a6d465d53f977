//! The geometry store adapter: bbox/property-filtered feature queries.

use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use tile_common::{BoundingBox, Feature, Geometry, TileError, TileResult};

/// Hard cap on rows returned by a single query. Requested limits above
/// this are clamped, not rejected.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Parameters for a feature query. All filters are optional; `limit`
/// is clamped to [`MAX_QUERY_LIMIT`].
#[derive(Debug, Clone)]
pub struct FeatureQuery {
    pub bbox: Option<BoundingBox>,
    pub layer: Option<String>,
    /// Single `key=value` equality predicate over the property map.
    pub property_filter: Option<(String, String)>,
    pub tileset_id: Option<Uuid>,
    pub limit: usize,
}

impl Default for FeatureQuery {
    fn default() -> Self {
        Self {
            bbox: None,
            layer: None,
            property_filter: None,
            tileset_id: None,
            limit: MAX_QUERY_LIMIT,
        }
    }
}

impl FeatureQuery {
    /// Validate before touching the database.
    pub fn validate(&self) -> TileResult<()> {
        if let Some(bbox) = &self.bbox {
            bbox.validate()?;
        }
        Ok(())
    }

    /// The limit actually applied, after clamping.
    pub fn effective_limit(&self) -> usize {
        self.limit.min(MAX_QUERY_LIMIT).max(1)
    }

    /// Parse a `key=value` filter parameter.
    pub fn parse_property_filter(s: &str) -> TileResult<(String, String)> {
        match s.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                Ok((key.to_string(), value.to_string()))
            }
            _ => Err(TileError::InvalidParameter {
                param: "filter".into(),
                message: format!("expected 'key=value', got '{}'", s),
            }),
        }
    }
}

#[derive(FromRow)]
struct FeatureRow {
    id: Uuid,
    tileset_id: Uuid,
    layer: String,
    geometry: Value,
    properties: Value,
}

impl FeatureRow {
    fn into_feature(self) -> TileResult<Feature> {
        let geometry: Geometry = serde_json::from_value(self.geometry).map_err(|e| {
            TileError::DatabaseError(format!("malformed geometry for feature {}: {}", self.id, e))
        })?;

        let properties = match self.properties {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(TileError::DatabaseError(format!(
                    "properties for feature {} is not an object: {}",
                    self.id, other
                )))
            }
        };

        Ok(Feature {
            id: self.id,
            tileset_id: self.tileset_id,
            layer: self.layer,
            geometry,
            properties,
        })
    }
}

/// Read-only query access to the feature table.
pub struct FeatureStore {
    pool: PgPool,
}

impl FeatureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run a feature query. Results are ordered by feature id so that
    /// repeated calls with identical inputs see identical sequences,
    /// which keeps downstream tile encoding reproducible.
    pub async fn query(&self, query: &FeatureQuery) -> TileResult<Vec<Feature>> {
        query.validate()?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, tileset_id, layer, geometry, properties FROM features WHERE 1 = 1",
        );

        if let Some(tileset_id) = query.tileset_id {
            builder.push(" AND tileset_id = ");
            builder.push_bind(tileset_id);
        }

        if let Some(layer) = &query.layer {
            builder.push(" AND layer = ");
            builder.push_bind(layer.clone());
        }

        if let Some(bbox) = &query.bbox {
            // Overlap test against the denormalized bbox columns.
            builder.push(" AND bbox_min_x <= ");
            builder.push_bind(bbox.max_x);
            builder.push(" AND bbox_max_x >= ");
            builder.push_bind(bbox.min_x);
            builder.push(" AND bbox_min_y <= ");
            builder.push_bind(bbox.max_y);
            builder.push(" AND bbox_max_y >= ");
            builder.push_bind(bbox.min_y);
        }

        if let Some((key, value)) = &query.property_filter {
            builder.push(" AND properties ->> ");
            builder.push_bind(key.clone());
            builder.push(" = ");
            builder.push_bind(value.clone());
        }

        builder.push(" ORDER BY id LIMIT ");
        builder.push_bind(query.effective_limit() as i64);

        let rows: Vec<FeatureRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TileError::DatabaseError(format!("Query failed: {}", e)))?;

        rows.into_iter().map(|r| r.into_feature()).collect()
    }
}
