//! Storage abstractions for tile-atlas services.
//!
//! Provides unified interfaces for:
//! - PostgreSQL catalog (tilesets, datasources) and feature queries
//! - Byte-range access to remote archives and rasters (HTTP, S3, file)
//! - Single-flight caching for decoded remote metadata

pub mod catalog;
pub mod features;
pub mod range;
pub mod single_flight;

pub use catalog::{Catalog, Datasource, DatasourceKind, Tileset, TilesetKind};
pub use features::{FeatureQuery, FeatureStore, MAX_QUERY_LIMIT};
pub use range::{
    FileRangeSource, HttpRangeSource, MemoryRangeSource, RangeSource, RangeSourceFactory,
    SourceValidator,
};
pub use single_flight::SingleFlightCache;
