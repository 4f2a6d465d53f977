//! Tile fetch: `/tiles/{tileset_id}/{z}/{x}/{y}.{format}`.
//!
//! Dispatched by tileset kind: vector tilesets are encoded from the
//! feature table on the fly, archive tilesets are extracted from
//! their single-file archive, raster tilesets are windowed out of
//! their cloud-optimized source.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::Path, response::Response, Extension};
use serde_json::Value;
use tracing::debug;

use mvt_encoder::{encode_tile, EncodeOptions, BUFFER_FRACTION};
use storage::{FeatureQuery, Tileset, TilesetKind, MAX_QUERY_LIMIT};
use tile_common::{TileCoord, TileError};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::validation::{parse_tile_coord, parse_uuid, parse_y_and_format};

use super::{content_type_for, convert_png_to_jpeg, convert_png_to_webp, tile_response};

pub async fn tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((tileset_id, z, x, y_format)): Path<(String, u8, u32, String)>,
) -> ApiResult<Response> {
    let tileset_id = parse_uuid(&tileset_id, "tileset_id")?;
    let (y, format) = parse_y_and_format(&y_format)?;
    let coord = parse_tile_coord(z, x, y)?;

    let started = Instant::now();
    let tileset = state.catalog.get_tileset(tileset_id).await?;

    let kind_label = match tileset.kind {
        TilesetKind::Vector => "vector",
        TilesetKind::Raster => "raster",
        TilesetKind::Archive => "archive",
    };

    let result = match tileset.kind {
        TilesetKind::Vector => vector_tile(&state, &tileset, coord, &format).await,
        TilesetKind::Archive => archive_tile(&state, &tileset, coord, &format).await,
        TilesetKind::Raster => raster_tile(&state, &tileset, coord, &format).await,
    };

    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!("tiles_served_total", "kind" => kind_label, "status" => status)
        .increment(1);
    metrics::histogram!("tile_render_seconds", "kind" => kind_label)
        .record(started.elapsed().as_secs_f64());

    result
}

async fn vector_tile(
    state: &AppState,
    tileset: &Tileset,
    coord: TileCoord,
    format: &str,
) -> ApiResult<Response> {
    if !matches!(format, "pbf" | "mvt") {
        return Err(TileError::UnsupportedFormat(format!(
            "vector tilesets serve pbf, not {}",
            format
        ))
        .into());
    }

    // Outside the declared zoom range the tile is explicitly empty,
    // which the HTTP contract reports as 404 rather than an error
    // body.
    if !tileset.zoom_in_range(coord.z) {
        return Err(TileError::TileNotFound.into());
    }

    // Fetch with an edge buffer so boundary geometry clips cleanly.
    let query = FeatureQuery {
        bbox: Some(coord.bbox().buffered(BUFFER_FRACTION)),
        tileset_id: Some(tileset.id),
        limit: MAX_QUERY_LIMIT,
        ..Default::default()
    };
    let features = state.features.query(&query).await?;

    let tile = encode_tile(&features, coord, None, &EncodeOptions::default());
    debug!(
        tileset = %tileset.id,
        tile = %coord.cache_key(),
        features = features.len(),
        bytes = tile.len(),
        "encoded vector tile"
    );

    if tile.is_empty() {
        return Err(TileError::TileNotFound.into());
    }
    Ok(tile_response("application/x-protobuf", tile))
}

async fn archive_tile(
    state: &AppState,
    tileset: &Tileset,
    coord: TileCoord,
    format: &str,
) -> ApiResult<Response> {
    let datasource = state.catalog.get_datasource_for_tileset(tileset.id).await?;
    let source = state.sources.open(&datasource.url)?;

    let data = state
        .archives
        .read_tile(&source, coord.z, coord.x, coord.y)
        .await?;

    Ok(tile_response(content_type_for(format)?, data.to_vec()))
}

async fn raster_tile(
    state: &AppState,
    tileset: &Tileset,
    coord: TileCoord,
    format: &str,
) -> ApiResult<Response> {
    let content_type = content_type_for(format)?;
    if !matches!(format, "png" | "jpg" | "jpeg" | "webp") {
        return Err(TileError::UnsupportedFormat(format!(
            "raster tilesets serve png/jpeg/webp, not {}",
            format
        ))
        .into());
    }

    let datasource = state.catalog.get_datasource_for_tileset(tileset.id).await?;
    let source = state.sources.open(&datasource.url)?;
    let options = raster_options(tileset)?;

    let png = state.rasters.read_tile(&source, coord, &options).await?;

    let body = match format {
        "jpg" | "jpeg" => convert_png_to_jpeg(&png)?,
        "webp" => convert_png_to_webp(&png)?,
        _ => png,
    };
    Ok(tile_response(content_type, body))
}

/// Band mapping and resampling policy come from the tileset's
/// metadata map; a malformed mapping is a configuration error.
fn raster_options(tileset: &Tileset) -> Result<cog_reader::RasterOptions, TileError> {
    let band_mapping = match tileset.metadata.get("band_mapping") {
        None | Some(Value::Null) => None,
        Some(Value::Array(entries)) => {
            let mut mapping = Vec::with_capacity(entries.len());
            for entry in entries {
                let band = entry.as_u64().ok_or_else(|| {
                    TileError::InvalidBandMapping(format!("'{}' is not a band index", entry))
                })?;
                mapping.push(band as usize);
            }
            Some(mapping)
        }
        Some(other) => {
            return Err(TileError::InvalidBandMapping(format!(
                "band_mapping must be an array, got {}",
                other
            )))
        }
    };

    let categorical = tileset
        .metadata
        .get("categorical")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok(cog_reader::RasterOptions {
        band_mapping,
        categorical,
    })
}
