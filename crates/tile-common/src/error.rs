//! Error types for tile-atlas services.

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Primary error type for tile and analytics operations.
#[derive(Debug, Error)]
pub enum TileError {
    // === Validation Errors (rejected before any I/O) ===
    #[error("Invalid parameter '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid radii: {0}")]
    InvalidRadii(String),

    #[error("Invalid band mapping: {0}")]
    InvalidBandMapping(String),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Requested format not supported: {0}")]
    UnsupportedFormat(String),

    // === Not Found (terminal, not retried) ===
    #[error("Tileset not found: {0}")]
    TilesetNotFound(String),

    #[error("Datasource not found: {0}")]
    DatasourceNotFound(String),

    #[error("Tile not found")]
    TileNotFound,

    // === Upstream / Data Integrity ===
    #[error("Upstream source unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Invalid archive format: {0}")]
    InvalidArchiveFormat(String),

    #[error("Invalid raster format: {0}")]
    InvalidRasterFormat(String),

    // === Infrastructure ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TileError {
    /// Stable machine-readable tag for this error, carried in every
    /// error response body.
    pub fn kind(&self) -> &'static str {
        match self {
            TileError::InvalidParameter { .. } => "invalid_parameter",
            TileError::InvalidBbox(_) => "invalid_bbox",
            TileError::InvalidRadii(_) => "invalid_radii",
            TileError::InvalidBandMapping(_) => "invalid_band_mapping",
            TileError::UnsupportedCrs(_) => "unsupported_crs",
            TileError::UnsupportedFormat(_) => "unsupported_format",
            TileError::TilesetNotFound(_) => "tileset_not_found",
            TileError::DatasourceNotFound(_) => "datasource_not_found",
            TileError::TileNotFound => "tile_not_found",
            TileError::UpstreamUnreachable(_) => "upstream_unreachable",
            TileError::InvalidArchiveFormat(_) => "invalid_archive_format",
            TileError::InvalidRasterFormat(_) => "invalid_raster_format",
            TileError::DatabaseError(_) => "database_error",
            TileError::StorageError(_) => "storage_error",
            TileError::Internal(_) => "internal_error",
        }
    }

    /// Optional remediation hint for the caller.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            TileError::UpstreamUnreachable(_) => {
                Some("source may be private; verify credentials and URL")
            }
            TileError::InvalidArchiveFormat(_) => {
                Some("the archive may be truncated or not a supported tile archive")
            }
            TileError::InvalidBandMapping(_) => {
                Some("check the datasource band mapping against the probed band count")
            }
            _ => None,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TileError::InvalidParameter { .. }
            | TileError::InvalidBbox(_)
            | TileError::InvalidRadii(_)
            | TileError::InvalidBandMapping(_)
            | TileError::UnsupportedCrs(_)
            | TileError::UnsupportedFormat(_) => 400,

            TileError::TilesetNotFound(_)
            | TileError::DatasourceNotFound(_)
            | TileError::TileNotFound => 404,

            TileError::InvalidArchiveFormat(_) | TileError::InvalidRasterFormat(_) => 422,

            TileError::UpstreamUnreachable(_) => 502,

            _ => 500,
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for TileError {
    fn from(err: std::io::Error) -> Self {
        TileError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for TileError {
    fn from(err: serde_json::Error) -> Self {
        TileError::Internal(format!("JSON error: {}", err))
    }
}
