//! Windowed tile reads against a parsed raster.

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use serde::Serialize;
use tracing::debug;

use storage::{RangeSource, SingleFlightCache, SourceValidator};
use tile_common::tile::wgs84_to_mercator;
use tile_common::{TileCoord, TileError, TileResult};

use crate::png;
use crate::resample::{self, Method, Region, SourceWindow};
use crate::tiff::{
    parse_tiff, TiffIfd, TiffMetadata, COMPRESSION_DEFLATE, COMPRESSION_DEFLATE_OLD,
    COMPRESSION_NONE,
};
use crate::TILE_SIZE;

/// Resampling method, chosen by the datasource's declared data kind.
pub type Resampling = Method;

const DEFAULT_REVALIDATE_AFTER: Duration = Duration::from_secs(60);

/// Per-datasource read options.
#[derive(Debug, Clone, Default)]
pub struct RasterOptions {
    /// Source band indices for the output channels: one entry for
    /// grayscale, three for RGB, four for RGBA. `None` picks a
    /// default from the band count.
    pub band_mapping: Option<Vec<usize>>,
    /// Categorical data is resampled nearest-neighbor; everything
    /// else bilinear.
    pub categorical: bool,
}

/// Cached parse of a raster's structure.
#[derive(Clone)]
pub struct CachedRaster {
    pub metadata: Arc<TiffMetadata>,
    pub validator: SourceValidator,
    fetched_at: Instant,
}

/// Probe metadata for raster datasources.
#[derive(Debug, Clone, Serialize)]
pub struct RasterInfo {
    pub band_count: u16,
    pub native_crs: String,
    pub width: u64,
    pub height: u64,
    pub overview_count: usize,
    pub tile_width: u64,
    pub tile_height: u64,
    pub compression: String,
}

/// Produces map tiles from cloud-optimized rasters with bounded
/// byte-range reads. Parsed structure is cached per source URL.
pub struct RasterReader {
    cache: SingleFlightCache<CachedRaster>,
    revalidate_after: Duration,
}

impl Default for RasterReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterReader {
    pub fn new() -> Self {
        Self {
            cache: SingleFlightCache::new(),
            revalidate_after: DEFAULT_REVALIDATE_AFTER,
        }
    }

    pub fn with_revalidate_after(revalidate_after: Duration) -> Self {
        Self {
            cache: SingleFlightCache::new(),
            revalidate_after,
        }
    }

    /// Cached metadata for a source, parsing it on first access and
    /// revalidating against the upstream validator once stale.
    pub async fn open(&self, source: &Arc<dyn RangeSource>) -> TileResult<Arc<CachedRaster>> {
        let key = source.url().to_string();

        if let Some(hit) = self.cache.get(&key).await {
            if hit.fetched_at.elapsed() < self.revalidate_after {
                return Ok(hit);
            }
            let current = source.validator().await?;
            if current == hit.validator {
                let refreshed = CachedRaster {
                    fetched_at: Instant::now(),
                    ..(*hit).clone()
                };
                return Ok(self.cache.insert(&key, refreshed).await);
            }
            debug!(url = %key, "raster changed upstream, reparsing");
            self.cache.invalidate(&key).await;
        }

        let source = source.clone();
        self.cache
            .get_or_load(&key, move || async move {
                let validator = source.validator().await?;
                let metadata = parse_tiff(&source).await?;
                Ok(CachedRaster {
                    metadata: Arc::new(metadata),
                    validator,
                    fetched_at: Instant::now(),
                })
            })
            .await
    }

    /// Render the (z, x, y) tile as a PNG.
    ///
    /// The tile's window is reprojected into the raster's CRS, the
    /// best-matching overview selected, and only the intersecting
    /// internal blocks fetched. A window with no coverage at all is
    /// `TileNotFound`.
    pub async fn read_tile(
        &self,
        source: &Arc<dyn RangeSource>,
        coord: TileCoord,
        options: &RasterOptions,
    ) -> TileResult<Vec<u8>> {
        let cached = self.open(source).await?;
        let metadata = &cached.metadata;

        let bbox = coord.bbox();
        let (min_x, min_y, max_x, max_y) = match metadata.epsg {
            4326 => (bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y),
            3857 => {
                let (x0, y0) = wgs84_to_mercator(bbox.min_x, bbox.min_y);
                let (x1, y1) = wgs84_to_mercator(bbox.max_x, bbox.max_y);
                (x0, y0, x1, y1)
            }
            other => {
                return Err(TileError::UnsupportedCrs(format!("EPSG:{}", other)));
            }
        };

        let mapping = resolve_band_mapping(
            metadata.full().samples_per_pixel,
            options.band_mapping.as_deref(),
        )?;

        // Coarsest overview still at least as fine as the output.
        let target_pixel_size = (max_x - min_x) / TILE_SIZE as f64;
        let level = select_overview(metadata, target_pixel_size);
        let ifd = &metadata.ifds[level];
        let transform = metadata.transform_for(level);

        let (col0, row0) = transform.world_to_pixel(min_x, max_y);
        let (col1, row1) = transform.world_to_pixel(max_x, min_y);

        if col1 <= 0.0 || row1 <= 0.0 || col0 >= ifd.width as f64 || row0 >= ifd.height as f64 {
            return Err(TileError::TileNotFound);
        }

        let region = self.fetch_region(source, ifd, col0, row0, col1, row1).await?;

        let window = SourceWindow {
            col0,
            row0,
            col1,
            row1,
            image_width: ifd.width,
            image_height: ifd.height,
        };
        let method = if options.categorical {
            Method::Nearest
        } else {
            Method::Bilinear
        };

        let rgba = resample::resample_to_rgba(
            &region,
            window,
            TILE_SIZE as usize,
            &mapping,
            method,
        );

        png::create_png(&rgba, TILE_SIZE as usize, TILE_SIZE as usize)
    }

    /// Fetch and assemble the internal tiles covering a pixel window.
    async fn fetch_region(
        &self,
        source: &Arc<dyn RangeSource>,
        ifd: &TiffIfd,
        col0: f64,
        row0: f64,
        col1: f64,
        row1: f64,
    ) -> TileResult<Region> {
        let across = ifd.tiles_across();
        let down = ifd.tiles_down();

        let tx0 = ((col0.max(0.0)) / ifd.tile_width as f64).floor() as u64;
        let ty0 = ((row0.max(0.0)) / ifd.tile_height as f64).floor() as u64;
        let tx1 = (((col1.min(ifd.width as f64) - 1e-9).max(0.0)) / ifd.tile_width as f64)
            .floor() as u64;
        let ty1 = (((row1.min(ifd.height as f64) - 1e-9).max(0.0)) / ifd.tile_height as f64)
            .floor() as u64;
        let tx1 = tx1.min(across - 1);
        let ty1 = ty1.min(down - 1);

        debug!(
            url = %source.url(),
            tiles = (tx1 - tx0 + 1) * (ty1 - ty0 + 1),
            "fetching raster blocks"
        );

        let bands = ifd.samples_per_pixel as usize;
        let block_len = (ifd.tile_width * ifd.tile_height) as usize * bands;

        let mut fetches = Vec::new();
        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                let index = (ty * across + tx) as usize;
                let offset = ifd.tile_offsets[index];
                let length = ifd.tile_byte_counts[index];
                let compression = ifd.compression;
                let source = source.clone();
                fetches.push(async move {
                    let raw = source.read_range(offset, length).await?;
                    let block = decompress_block(&raw, compression)?;
                    if block.len() != block_len {
                        return Err(TileError::InvalidRasterFormat(format!(
                            "block decoded to {} bytes, expected {}",
                            block.len(),
                            block_len
                        )));
                    }
                    Ok::<Vec<u8>, TileError>(block)
                });
            }
        }

        let blocks = try_join_all(fetches).await?;

        let region_width = ((tx1 - tx0 + 1) * ifd.tile_width) as usize;
        let region_height = ((ty1 - ty0 + 1) * ifd.tile_height) as usize;
        let mut data = vec![0u8; region_width * region_height * bands];

        let mut block_iter = blocks.into_iter();
        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                let block = block_iter.next().expect("one block per tile");
                let base_x = ((tx - tx0) * ifd.tile_width) as usize;
                let base_y = ((ty - ty0) * ifd.tile_height) as usize;
                let row_bytes = ifd.tile_width as usize * bands;

                for row in 0..ifd.tile_height as usize {
                    let src = row * row_bytes;
                    let dst = ((base_y + row) * region_width + base_x) * bands;
                    data[dst..dst + row_bytes].copy_from_slice(&block[src..src + row_bytes]);
                }
            }
        }

        Ok(Region {
            width: region_width,
            height: region_height,
            bands,
            data,
            origin_col: (tx0 * ifd.tile_width) as f64,
            origin_row: (ty0 * ifd.tile_height) as f64,
        })
    }

    /// Extract descriptive metadata for the connectivity probe.
    pub async fn probe(&self, source: &Arc<dyn RangeSource>) -> TileResult<RasterInfo> {
        let cached = self.open(source).await?;
        let metadata = &cached.metadata;
        let full = metadata.full();

        Ok(RasterInfo {
            band_count: full.samples_per_pixel,
            native_crs: format!("EPSG:{}", metadata.epsg),
            width: full.width,
            height: full.height,
            overview_count: metadata.ifds.len() - 1,
            tile_width: full.tile_width,
            tile_height: full.tile_height,
            compression: compression_name(full.compression).to_string(),
        })
    }

    pub async fn invalidate(&self, url: &str) {
        self.cache.invalidate(url).await;
    }
}

/// Pick the coarsest level whose pixel size does not exceed the
/// target; when even full resolution is coarser than the target
/// (over-zoomed), magnify full resolution.
fn select_overview(metadata: &TiffMetadata, target_pixel_size: f64) -> usize {
    let native = metadata.geo_transform.a.abs();
    let mut best: Option<(usize, f64)> = None;

    for index in 0..metadata.ifds.len() {
        let pixel_size = native * metadata.reduction_factor(index);
        if pixel_size <= target_pixel_size * (1.0 + 1e-9) {
            match best {
                Some((_, current)) if current >= pixel_size => {}
                _ => best = Some((index, pixel_size)),
            }
        }
    }

    best.map(|(index, _)| index).unwrap_or(0)
}

fn resolve_band_mapping(samples: u16, requested: Option<&[usize]>) -> TileResult<Vec<usize>> {
    let mapping = match requested {
        Some(mapping) => mapping.to_vec(),
        None if samples >= 4 => vec![0, 1, 2, 3],
        None if samples == 3 => vec![0, 1, 2],
        None => vec![0],
    };

    if !matches!(mapping.len(), 1 | 3 | 4) {
        return Err(TileError::InvalidBandMapping(format!(
            "mapping must have 1, 3 or 4 entries, got {}",
            mapping.len()
        )));
    }
    for &band in &mapping {
        if band >= samples as usize {
            return Err(TileError::InvalidBandMapping(format!(
                "band {} out of range for {}-band source",
                band, samples
            )));
        }
    }
    Ok(mapping)
}

fn decompress_block(data: &[u8], compression: u16) -> TileResult<Vec<u8>> {
    match compression {
        COMPRESSION_NONE => Ok(data.to_vec()),
        COMPRESSION_DEFLATE | COMPRESSION_DEFLATE_OLD => {
            let mut decoder = flate2::read::ZlibDecoder::new(data);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| {
                TileError::InvalidRasterFormat(format!("deflate block failed: {}", e))
            })?;
            Ok(out)
        }
        other => Err(TileError::InvalidRasterFormat(format!(
            "unsupported compression scheme {}",
            other
        ))),
    }
}

fn compression_name(compression: u16) -> &'static str {
    match compression {
        COMPRESSION_NONE => "none",
        COMPRESSION_DEFLATE | COMPRESSION_DEFLATE_OLD => "deflate",
        _ => "unknown",
    }
}
