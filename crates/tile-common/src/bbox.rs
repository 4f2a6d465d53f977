//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};

/// A geographic bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The whole world in WGS84.
    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Parse a bbox query parameter string: "minx,miny,maxx,maxy".
    ///
    /// The parsed box is validated; a box with `minx > maxx` or
    /// `miny > maxy` (including antimeridian-crossing requests) is
    /// rejected here, before any I/O happens.
    pub fn from_param(s: &str) -> TileResult<Self> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return Err(TileError::InvalidBbox(format!(
                "expected 'minx,miny,maxx,maxy', got '{}'",
                s
            )));
        }

        let mut vals = [0.0f64; 4];
        for (i, part) in parts.iter().enumerate() {
            vals[i] = part.trim().parse().map_err(|_| {
                TileError::InvalidBbox(format!("'{}' is not a number", part))
            })?;
        }

        let bbox = Self::new(vals[0], vals[1], vals[2], vals[3]);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check coordinate ordering. Antimeridian-crossing boxes are
    /// rejected rather than wrapped; see DESIGN.md.
    pub fn validate(&self) -> TileResult<()> {
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return Err(TileError::InvalidBbox(format!(
                "min corner must not exceed max corner: [{}, {}, {}, {}]",
                self.min_x, self.min_y, self.max_x, self.max_y
            )));
        }
        Ok(())
    }

    /// Width of the bounding box in degrees.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in degrees.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Midpoint of the box.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Expand the box by a fraction of its own width/height on every
    /// side. Used for the tile-edge buffer when querying features.
    pub fn buffered(&self, fraction: f64) -> BoundingBox {
        let dx = self.width() * fraction;
        let dy = self.height() * fraction;
        BoundingBox::new(
            self.min_x - dx,
            self.min_y - dy,
            self.max_x + dx,
            self.max_y + dy,
        )
    }

    /// Generate a cache key fragment for this bbox (quantized to avoid
    /// floating point noise).
    pub fn cache_key(&self) -> String {
        format!(
            "{:.6}_{:.6}_{:.6}_{:.6}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }

    /// As the `[w, s, e, n]` array TileJSON and GeoJSON use.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}
