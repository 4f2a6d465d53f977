//! Windowed reading of cloud-optimized rasters.
//!
//! A cloud-optimized GeoTIFF is internally tiled and carries reduced-
//! resolution overviews, so a map tile can be produced from a handful
//! of byte-range reads: parse the IFD chain once (cached), pick the
//! overview closest to the output resolution, fetch only the internal
//! tile blocks intersecting the reprojected window, then resample to
//! the fixed output size and encode PNG.

pub mod png;
pub mod reader;
pub mod resample;
pub mod tiff;

pub use reader::{RasterInfo, RasterOptions, RasterReader, Resampling};
pub use tiff::{GeoTransform, TiffIfd, TiffMetadata};

/// Output tile edge length in pixels.
pub const TILE_SIZE: u32 = 256;

#[cfg(test)]
pub(crate) mod testutil;
