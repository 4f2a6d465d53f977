//! Tile pyramid math for the z/x/y addressing scheme.
//!
//! Zoom level z has 2^z x 2^z tiles covering the world in the
//! Web Mercator (XYZ, top-left origin) layout.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Highest zoom level the pyramid addresses.
pub const MAX_ZOOM: u8 = 22;

/// Web Mercator half-extent in meters.
pub const MERCATOR_EXTENT_M: f64 = 20037508.342789244;

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Whether x/y fall inside the 2^z grid for this zoom.
    pub fn in_range(&self) -> bool {
        let n = 1u64 << self.z;
        self.z <= MAX_ZOOM && (self.x as u64) < n && (self.y as u64) < n
    }

    /// Generate a cache key string.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.z, self.x, self.y)
    }

    /// Get the parent tile (zoom - 1).
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord {
            z: self.z - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// WGS84 bounds of this tile.
    pub fn bbox(&self) -> BoundingBox {
        tile_bbox(self)
    }
}

/// Calculate the bounding box for a tile in WGS84 degrees.
pub fn tile_bbox(coord: &TileCoord) -> BoundingBox {
    let n = (1u64 << coord.z) as f64;

    let lon_min = coord.x as f64 / n * 360.0 - 180.0;
    let lon_max = (coord.x + 1) as f64 / n * 360.0 - 180.0;

    let lat_max = (PI * (1.0 - 2.0 * coord.y as f64 / n)).sinh().atan().to_degrees();
    let lat_min = (PI * (1.0 - 2.0 * (coord.y + 1) as f64 / n))
        .sinh()
        .atan()
        .to_degrees();

    BoundingBox::new(lon_min, lat_min, lon_max, lat_max)
}

/// Convert lat/lon to the tile containing it at a given zoom.
pub fn latlon_to_tile(lat: f64, lon: f64, zoom: u8) -> TileCoord {
    let n = (1u64 << zoom) as f64;

    let x = ((lon + 180.0) / 360.0 * n).floor().clamp(0.0, n - 1.0) as u32;
    let lat_rad = lat.to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n)
        .floor()
        .clamp(0.0, n - 1.0) as u32;

    TileCoord { z: zoom, x, y }
}

/// Convert WGS84 lon/lat to Web Mercator meters.
pub fn wgs84_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon / 180.0 * MERCATOR_EXTENT_M;
    // Clamp to the Mercator-valid latitude band
    let lat = lat.clamp(-85.06, 85.06);
    let y = (lat.to_radians() / 2.0 + PI / 4.0).tan().ln() / PI * MERCATOR_EXTENT_M;
    (x, y)
}

/// Convert Web Mercator meters to WGS84 lon/lat.
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x / MERCATOR_EXTENT_M * 180.0;
    let lat = (2.0 * (y / MERCATOR_EXTENT_M * PI).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Ground resolution (meters per pixel) of a 256px tile at a zoom
/// level, measured at the equator.
pub fn meters_per_pixel(zoom: u8) -> f64 {
    2.0 * MERCATOR_EXTENT_M / (256.0 * (1u64 << zoom) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_zero_covers_world() {
        let bbox = tile_bbox(&TileCoord::new(0, 0, 0));
        assert!((bbox.min_x - (-180.0)).abs() < 1e-9);
        assert!((bbox.max_x - 180.0).abs() < 1e-9);
        assert!(bbox.max_y > 85.0);
        assert!(bbox.min_y < -85.0);
    }

    #[test]
    fn test_latlon_to_tile_nyc() {
        let coord = latlon_to_tile(40.7128, -74.0060, 10);
        assert_eq!(coord.z, 10);
        assert!(coord.x > 290 && coord.x < 310);
        assert!(coord.y > 370 && coord.y < 400);

        // The tile's bbox must contain the point
        let bbox = coord.bbox();
        assert!(bbox.contains_point(-74.0060, 40.7128));
    }

    #[test]
    fn test_parent() {
        let tile = TileCoord::new(5, 10, 15);
        assert_eq!(tile.parent().unwrap(), TileCoord::new(4, 5, 7));
        assert!(TileCoord::new(0, 0, 0).parent().is_none());
    }

    #[test]
    fn test_in_range() {
        assert!(TileCoord::new(2, 3, 3).in_range());
        assert!(!TileCoord::new(2, 4, 0).in_range());
        assert!(!TileCoord::new(23, 0, 0).in_range());
    }

    #[test]
    fn test_mercator_roundtrip() {
        let (x, y) = wgs84_to_mercator(-74.006, 40.7128);
        let (lon, lat) = mercator_to_wgs84(x, y);
        assert!((lon - (-74.006)).abs() < 1e-6);
        assert!((lat - 40.7128).abs() < 1e-6);
    }

    #[test]
    fn test_mercator_known_point() {
        // NYC in Web Mercator: about (-8238310, 4970072)
        let (x, y) = wgs84_to_mercator(-74.006, 40.7128);
        assert!((x - (-8238310.0)).abs() < 1000.0);
        assert!((y - 4970072.0).abs() < 1000.0);
    }

    #[test]
    fn test_meters_per_pixel_halves_per_zoom() {
        let z0 = meters_per_pixel(0);
        let z1 = meters_per_pixel(1);
        assert!((z0 / z1 - 2.0).abs() < 1e-9);
        // Standard value at z0 is ~156543 m/px
        assert!((z0 - 156543.03392804097).abs() < 0.001);
    }
}
