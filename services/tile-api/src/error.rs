//! HTTP mapping for the error taxonomy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use tile_common::TileError;

/// Wrapper so `TileError` can flow out of handlers with `?`.
#[derive(Debug)]
pub struct ApiError(pub TileError);

impl From<TileError> for ApiError {
    fn from(err: TileError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut body = json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
            }
        });
        if let Some(hint) = self.0.hint() {
            body["error"]["hint"] = json!(hint);
        }

        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), "request failed: {}", self.0);
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
