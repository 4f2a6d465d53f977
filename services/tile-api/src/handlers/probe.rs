//! Datasource connectivity probe.
//!
//! Validates that a registered external source is reachable, extracts
//! lightweight descriptive metadata, and writes the snapshot back to
//! the datasource row. A failed probe is a successful request with
//! `status: "error"` — the caller asked whether the source works.

use std::sync::Arc;

use axum::{extract::Path, Extension, Json};
use serde_json::{json, Value};
use tracing::{info, warn};

use storage::{Datasource, DatasourceKind};
use tile_common::{TileError, TileResult};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::validation::parse_uuid;

pub async fn probe_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(datasource_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_uuid(&datasource_id, "datasource_id")?;
    let datasource = state.catalog.get_datasource(id).await?;

    let kind = match datasource.kind {
        DatasourceKind::Archive => "archive",
        DatasourceKind::Raster => "raster",
    };

    let body = match run_probe(&state, &datasource).await {
        Ok(metadata) => {
            // Refresh the datasource's cached snapshot; a write
            // failure should not fail the probe itself.
            if let Err(e) = state.catalog.update_datasource_probe(id, &metadata).await {
                warn!(datasource = %id, "failed to store probe result: {}", e);
            }
            info!(datasource = %id, kind, "probe succeeded");
            metrics::counter!("datasource_probes_total", "status" => "ok").increment(1);
            json!({
                "status": "ok",
                "type": kind,
                "metadata": metadata,
            })
        }
        Err(err) => {
            warn!(datasource = %id, kind, "probe failed: {}", err);
            metrics::counter!("datasource_probes_total", "status" => "error").increment(1);
            let mut body = json!({
                "status": "error",
                "type": kind,
                "message": err.to_string(),
            });
            if let Some(hint) = err.hint() {
                body["hint"] = json!(hint);
            }
            body
        }
    };

    Ok(Json(body))
}

async fn run_probe(state: &AppState, datasource: &Datasource) -> TileResult<Value> {
    let source = state.sources.open(&datasource.url)?;

    match datasource.kind {
        DatasourceKind::Archive => {
            let info = state.archives.probe(&source).await?;
            serde_json::to_value(info)
                .map_err(|e| TileError::Internal(format!("serialization failed: {}", e)))
        }
        DatasourceKind::Raster => {
            let info = state.rasters.probe(&source).await?;
            serde_json::to_value(info)
                .map_err(|e| TileError::Internal(format!("serialization failed: {}", e)))
        }
    }
}
