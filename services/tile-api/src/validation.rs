//! Request validation helpers, applied before any I/O.

use uuid::Uuid;

use tile_common::{TileCoord, TileError, TileResult};

/// Parse a UUID path/query parameter.
pub fn parse_uuid(value: &str, param: &str) -> TileResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| TileError::InvalidParameter {
        param: param.to_string(),
        message: format!("'{}' is not a valid UUID", value),
    })
}

/// Split the trailing `y.format` path segment.
pub fn parse_y_and_format(segment: &str) -> TileResult<(u32, String)> {
    let (y, format) = segment.split_once('.').ok_or_else(|| TileError::InvalidParameter {
        param: "y".into(),
        message: format!("expected 'y.format', got '{}'", segment),
    })?;

    let y: u32 = y.parse().map_err(|_| TileError::InvalidParameter {
        param: "y".into(),
        message: format!("'{}' is not a tile row", y),
    })?;

    if format.is_empty() || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(TileError::UnsupportedFormat(segment.to_string()));
    }

    Ok((y, format.to_ascii_lowercase()))
}

/// Validate a tile address against the pyramid.
pub fn parse_tile_coord(z: u8, x: u32, y: u32) -> TileResult<TileCoord> {
    let coord = TileCoord::new(z, x, y);
    if !coord.in_range() {
        return Err(TileError::InvalidParameter {
            param: "tile".into(),
            message: format!("{}/{}/{} is outside the tile pyramid", z, x, y),
        });
    }
    Ok(coord)
}

/// A lat/lon pair as analytics request bodies carry it.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct PointParam {
    pub lat: f64,
    pub lon: f64,
}

impl PointParam {
    /// Validate and convert to the `[lon, lat]` form geometry uses.
    pub fn position(&self) -> TileResult<[f64; 2]> {
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return Err(TileError::InvalidParameter {
                param: "point".into(),
                message: format!("({}, {}) is not a WGS84 position", self.lat, self.lon),
            });
        }
        Ok([self.lon, self.lat])
    }
}
