//! Metadata catalog using PostgreSQL.
//!
//! Tilesets, features and datasources are created and mutated by the
//! catalog API (an external collaborator); this core only reads them,
//! with one exception: the connectivity prober writes back the probed
//! metadata snapshot it extracted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use tile_common::{BoundingBox, TileError, TileResult};

/// What backs a tileset's tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TilesetKind {
    /// Encoded on the fly from the feature table.
    Vector,
    /// Windowed reads from a cloud-optimized raster.
    Raster,
    /// Pre-rendered tiles in a single-file archive.
    Archive,
}

impl TilesetKind {
    fn parse(s: &str) -> TileResult<Self> {
        match s {
            "vector" => Ok(TilesetKind::Vector),
            "raster" => Ok(TilesetKind::Raster),
            "archive" => Ok(TilesetKind::Archive),
            other => Err(TileError::DatabaseError(format!(
                "unknown tileset kind '{}'",
                other
            ))),
        }
    }
}

/// Kind of external datasource backing an archive/raster tileset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasourceKind {
    Archive,
    Raster,
}

impl DatasourceKind {
    fn parse(s: &str) -> TileResult<Self> {
        match s {
            "archive" => Ok(DatasourceKind::Archive),
            "raster" => Ok(DatasourceKind::Raster),
            other => Err(TileError::DatabaseError(format!(
                "unknown datasource kind '{}'",
                other
            ))),
        }
    }
}

/// A tileset as registered by the catalog API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tileset {
    pub id: Uuid,
    pub name: String,
    pub kind: TilesetKind,
    pub format: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub bounds: Option<BoundingBox>,
    pub center: Option<[f64; 3]>,
    pub public: bool,
    pub metadata: Value,
}

impl Tileset {
    /// Whether a zoom level falls inside the declared range.
    pub fn zoom_in_range(&self, z: u8) -> bool {
        z >= self.min_zoom && z <= self.max_zoom
    }
}

/// A registered external source plus its probed metadata cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datasource {
    pub id: Uuid,
    pub tileset_id: Uuid,
    pub kind: DatasourceKind,
    pub url: String,
    pub provider: String,
    pub probed_metadata: Option<Value>,
    pub probed_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct TilesetRow {
    id: Uuid,
    name: String,
    kind: String,
    format: String,
    min_zoom: i32,
    max_zoom: i32,
    bounds_min_x: Option<f64>,
    bounds_min_y: Option<f64>,
    bounds_max_x: Option<f64>,
    bounds_max_y: Option<f64>,
    center_lon: Option<f64>,
    center_lat: Option<f64>,
    center_zoom: Option<i32>,
    public: bool,
    metadata: Value,
}

impl TilesetRow {
    fn into_tileset(self) -> TileResult<Tileset> {
        let bounds = match (
            self.bounds_min_x,
            self.bounds_min_y,
            self.bounds_max_x,
            self.bounds_max_y,
        ) {
            (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => {
                Some(BoundingBox::new(min_x, min_y, max_x, max_y))
            }
            _ => None,
        };

        let center = match (self.center_lon, self.center_lat, self.center_zoom) {
            (Some(lon), Some(lat), Some(z)) => Some([lon, lat, z as f64]),
            _ => None,
        };

        Ok(Tileset {
            id: self.id,
            name: self.name,
            kind: TilesetKind::parse(&self.kind)?,
            format: self.format,
            min_zoom: self.min_zoom as u8,
            max_zoom: self.max_zoom as u8,
            bounds,
            center,
            public: self.public,
            metadata: self.metadata,
        })
    }
}

#[derive(FromRow)]
struct DatasourceRow {
    id: Uuid,
    tileset_id: Uuid,
    kind: String,
    url: String,
    provider: String,
    probed_metadata: Option<Value>,
    probed_at: Option<DateTime<Utc>>,
}

impl DatasourceRow {
    fn into_datasource(self) -> TileResult<Datasource> {
        Ok(Datasource {
            id: self.id,
            tileset_id: self.tileset_id,
            kind: DatasourceKind::parse(&self.kind)?,
            url: self.url,
            provider: self.provider,
            probed_metadata: self.probed_metadata,
            probed_at: self.probed_at,
        })
    }
}

/// Database connection pool and catalog lookups.
pub struct Catalog {
    pool: PgPool,
}

const TILESET_COLUMNS: &str = "id, name, kind, format, min_zoom, max_zoom, \
     bounds_min_x, bounds_min_y, bounds_max_x, bounds_max_y, \
     center_lon, center_lat, center_zoom, public, metadata";

const DATASOURCE_COLUMNS: &str =
    "id, tileset_id, kind, url, provider, probed_metadata, probed_at";

impl Catalog {
    /// Create a new catalog connection from database URL.
    pub async fn connect(database_url: &str) -> TileResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| TileError::DatabaseError(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (shared with the feature store).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Readiness check: does the database answer at all.
    pub async fn ping(&self) -> TileResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| TileError::DatabaseError(format!("ping failed: {}", e)))?;
        Ok(())
    }

    /// Create the tables this core reads. The catalog API owns the
    /// data; this exists so a fresh environment can come up without
    /// it.
    pub async fn migrate(&self) -> TileResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| TileError::DatabaseError(format!("Migration failed: {}", e)))?;
            }
        }
        Ok(())
    }

    /// Look up a tileset by id.
    pub async fn get_tileset(&self, id: Uuid) -> TileResult<Tileset> {
        let row = sqlx::query_as::<_, TilesetRow>(&format!(
            "SELECT {} FROM tilesets WHERE id = $1",
            TILESET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TileError::DatabaseError(format!("Query failed: {}", e)))?;

        row.ok_or_else(|| TileError::TilesetNotFound(id.to_string()))?
            .into_tileset()
    }

    /// Look up a datasource by id.
    pub async fn get_datasource(&self, id: Uuid) -> TileResult<Datasource> {
        let row = sqlx::query_as::<_, DatasourceRow>(&format!(
            "SELECT {} FROM datasources WHERE id = $1",
            DATASOURCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TileError::DatabaseError(format!("Query failed: {}", e)))?;

        row.ok_or_else(|| TileError::DatasourceNotFound(id.to_string()))?
            .into_datasource()
    }

    /// The datasource backing an archive/raster tileset.
    pub async fn get_datasource_for_tileset(&self, tileset_id: Uuid) -> TileResult<Datasource> {
        let row = sqlx::query_as::<_, DatasourceRow>(&format!(
            "SELECT {} FROM datasources WHERE tileset_id = $1 ORDER BY id LIMIT 1",
            DATASOURCE_COLUMNS
        ))
        .bind(tileset_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TileError::DatabaseError(format!("Query failed: {}", e)))?;

        row.ok_or_else(|| TileError::DatasourceNotFound(tileset_id.to_string()))?
            .into_datasource()
    }

    /// Distinct layer names present in a tileset's features.
    pub async fn list_layers(&self, tileset_id: Uuid) -> TileResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT layer FROM features WHERE tileset_id = $1 ORDER BY layer",
        )
        .bind(tileset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TileError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(rows.into_iter().map(|(layer,)| layer).collect())
    }

    /// Property keys seen in a layer, sampled for TileJSON field hints.
    pub async fn layer_field_hints(
        &self,
        tileset_id: Uuid,
        layer: &str,
    ) -> TileResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT jsonb_object_keys(properties) FROM ( \
                 SELECT properties FROM features \
                 WHERE tileset_id = $1 AND layer = $2 LIMIT 50 \
             ) sample ORDER BY 1",
        )
        .bind(tileset_id)
        .bind(layer)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TileError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    /// Store the probe result on the datasource row. This is the one
    /// write this core performs; everything else is owned by the
    /// catalog API.
    pub async fn update_datasource_probe(&self, id: Uuid, metadata: &Value) -> TileResult<()> {
        sqlx::query("UPDATE datasources SET probed_metadata = $2, probed_at = $3 WHERE id = $1")
            .bind(id)
            .bind(metadata)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| TileError::DatabaseError(format!("Update failed: {}", e)))?;

        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tilesets (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    format TEXT NOT NULL,
    min_zoom INTEGER NOT NULL DEFAULT 0,
    max_zoom INTEGER NOT NULL DEFAULT 22,
    bounds_min_x DOUBLE PRECISION,
    bounds_min_y DOUBLE PRECISION,
    bounds_max_x DOUBLE PRECISION,
    bounds_max_y DOUBLE PRECISION,
    center_lon DOUBLE PRECISION,
    center_lat DOUBLE PRECISION,
    center_zoom INTEGER,
    public BOOLEAN NOT NULL DEFAULT true,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb
);

CREATE TABLE IF NOT EXISTS features (
    id UUID PRIMARY KEY,
    tileset_id UUID NOT NULL REFERENCES tilesets(id),
    layer TEXT NOT NULL DEFAULT 'default',
    geometry JSONB NOT NULL,
    properties JSONB NOT NULL DEFAULT '{}'::jsonb,
    bbox_min_x DOUBLE PRECISION NOT NULL,
    bbox_min_y DOUBLE PRECISION NOT NULL,
    bbox_max_x DOUBLE PRECISION NOT NULL,
    bbox_max_y DOUBLE PRECISION NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_features_tileset_layer
    ON features (tileset_id, layer);
CREATE INDEX IF NOT EXISTS idx_features_bbox
    ON features (bbox_min_x, bbox_max_x, bbox_min_y, bbox_max_y);

CREATE TABLE IF NOT EXISTS datasources (
    id UUID PRIMARY KEY,
    tileset_id UUID NOT NULL REFERENCES tilesets(id),
    kind TEXT NOT NULL,
    url TEXT NOT NULL,
    provider TEXT NOT NULL DEFAULT 'http',
    probed_metadata JSONB,
    probed_at TIMESTAMPTZ
)
"#;
