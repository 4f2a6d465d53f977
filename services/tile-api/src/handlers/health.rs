//! Health, readiness and metrics endpoints.

use std::sync::Arc;

use axum::{http::StatusCode, Extension, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Ready only when the catalog database answers.
pub async fn ready_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> (StatusCode, Json<Value>) {
    match state.catalog.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "message": e.to_string() })),
        ),
    }
}

pub async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}
