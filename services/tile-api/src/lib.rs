//! Tile and analytics API service.
//!
//! HTTP server exposing the tile read path (vector encoding, archive
//! extraction, raster windowing), feature search, geospatial
//! analytics and datasource connectivity probes.

pub mod error;
pub mod handlers;
pub mod state;
pub mod validation;
