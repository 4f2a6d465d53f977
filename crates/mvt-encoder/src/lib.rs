//! Vector tile encoding.
//!
//! Turns features from the geometry store into binary MVT-format tiles:
//! coordinates are reprojected onto a 4096-unit integer grid local to
//! the tile, clipped against the tile plus an edge buffer, optionally
//! simplified at low zooms, and serialized as zigzag-delta command
//! streams with per-layer deduplicated key/value dictionaries.
//!
//! The protobuf wire format is written by hand (varints and
//! length-delimited fields), which keeps the output bytes a pure
//! deterministic function of the input feature sequence.

pub mod clip;
pub mod encoder;
pub mod geometry;
pub mod layer;
pub mod proto;
pub mod simplify;

pub use encoder::{encode_tile, EncodeOptions};
pub use layer::{LayerBuilder, TileBuilder};

/// Local integer grid units per tile axis (the conventional extent).
pub const EXTENT: u32 = 4096;

/// Fraction of the tile width used as an edge buffer for both the
/// feature query and the clip bounds, to avoid boundary artifacts.
pub const BUFFER_FRACTION: f64 = 0.05;

/// Zoom level at and above which line simplification is disabled so
/// geometry stays exact where detail matters.
pub const SIMPLIFY_MAX_ZOOM: u8 = 14;
