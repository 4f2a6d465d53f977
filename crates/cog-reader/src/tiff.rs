//! Classic TIFF structure parsing over byte ranges.
//!
//! Only what a cloud-optimized raster needs: the IFD chain (full
//! resolution plus overviews), tiling tags, 8-bit samples, deflate or
//! uncompressed blocks, and the GeoTIFF tags that anchor pixels to a
//! coordinate system.

use std::sync::Arc;

use bytes::Bytes;

use storage::RangeSource;
use tile_common::{TileError, TileResult};

// Tag numbers
const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_PLANAR_CONFIG: u16 = 284;
const TAG_TILE_WIDTH: u16 = 322;
const TAG_TILE_LENGTH: u16 = 323;
const TAG_TILE_OFFSETS: u16 = 324;
const TAG_TILE_BYTE_COUNTS: u16 = 325;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

// GeoKey ids
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

/// TIFF compression schemes this reader decodes.
pub const COMPRESSION_NONE: u16 = 1;
pub const COMPRESSION_DEFLATE: u16 = 8;
pub const COMPRESSION_DEFLATE_OLD: u16 = 32946;

/// Bytes fetched up front; most COG headers fit well inside this.
const INITIAL_WINDOW: u64 = 32 * 1024;

/// Cap on IFD chain length, against corrupt next-IFD loops.
const MAX_IFDS: usize = 16;

/// Affine transform between pixel and world coordinates:
/// `x_world = a * col + c`, `y_world = e * row + f` (no rotation).
#[derive(Debug, Clone, Copy)]
pub struct GeoTransform {
    pub a: f64,
    pub c: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// From ModelPixelScale + ModelTiepoint (the common COG pair).
    pub fn from_scale_and_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        // tiepoint maps raster (i, j) -> world (x, y); scale_y is
        // stored positive with the y axis pointing down.
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        Some(Self {
            a: scale[0],
            c: x - i * scale[0],
            e: -scale[1],
            f: y + j * scale[1],
        })
    }

    /// From the 4x4 ModelTransformation matrix (row-major).
    pub fn from_transformation(matrix: &[f64]) -> Option<Self> {
        if matrix.len() < 8 {
            return None;
        }
        Some(Self {
            a: matrix[0],
            c: matrix[3],
            e: matrix[5],
            f: matrix[7],
        })
    }

    /// World coordinates to fractional pixel (column, row).
    #[inline]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.c) / self.a, (y - self.f) / self.e)
    }

    /// Fractional pixel to world coordinates.
    #[inline]
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (self.a * col + self.c, self.e * row + self.f)
    }

    /// A copy scaled for an overview reduced by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            a: self.a * factor,
            c: self.c,
            e: self.e * factor,
            f: self.f,
        }
    }
}

/// One image in the file: full resolution or an overview.
#[derive(Debug, Clone)]
pub struct TiffIfd {
    pub width: u64,
    pub height: u64,
    pub samples_per_pixel: u16,
    pub bits_per_sample: u16,
    pub compression: u16,
    pub photometric: u16,
    pub tile_width: u64,
    pub tile_height: u64,
    pub tile_offsets: Vec<u64>,
    pub tile_byte_counts: Vec<u64>,
}

impl TiffIfd {
    pub fn tiles_across(&self) -> u64 {
        (self.width + self.tile_width - 1) / self.tile_width
    }

    pub fn tiles_down(&self) -> u64 {
        (self.height + self.tile_height - 1) / self.tile_height
    }
}

/// Parsed file structure: the IFD chain plus georeferencing.
#[derive(Debug, Clone)]
pub struct TiffMetadata {
    /// IFDs ordered as stored: index 0 is full resolution, the rest
    /// are progressively coarser overviews.
    pub ifds: Vec<TiffIfd>,
    pub geo_transform: GeoTransform,
    pub epsg: u32,
}

impl TiffMetadata {
    pub fn full(&self) -> &TiffIfd {
        &self.ifds[0]
    }

    /// Reduction factor of an overview relative to full resolution.
    pub fn reduction_factor(&self, index: usize) -> f64 {
        self.full().width as f64 / self.ifds[index].width as f64
    }

    /// Geotransform adjusted to an overview's pixel grid.
    pub fn transform_for(&self, index: usize) -> GeoTransform {
        self.geo_transform.scaled(self.reduction_factor(index))
    }
}

#[derive(Clone, Copy)]
struct Endian {
    little: bool,
}

impl Endian {
    fn u16(&self, b: &[u8]) -> u16 {
        let arr: [u8; 2] = b[..2].try_into().expect("2 bytes");
        if self.little {
            u16::from_le_bytes(arr)
        } else {
            u16::from_be_bytes(arr)
        }
    }

    fn u32(&self, b: &[u8]) -> u32 {
        let arr: [u8; 4] = b[..4].try_into().expect("4 bytes");
        if self.little {
            u32::from_le_bytes(arr)
        } else {
            u32::from_be_bytes(arr)
        }
    }

    fn f64(&self, b: &[u8]) -> f64 {
        let arr: [u8; 8] = b[..8].try_into().expect("8 bytes");
        if self.little {
            f64::from_le_bytes(arr)
        } else {
            f64::from_be_bytes(arr)
        }
    }
}

/// Serves reads from the initial prefetched window, falling back to
/// range requests for data past it.
struct Fetcher<'a> {
    source: &'a Arc<dyn RangeSource>,
    window: Bytes,
    file_len: u64,
}

impl<'a> Fetcher<'a> {
    async fn get(&self, offset: u64, length: u64) -> TileResult<Bytes> {
        if offset + length <= self.window.len() as u64 {
            let start = offset as usize;
            return Ok(self.window.slice(start..start + length as usize));
        }
        if offset + length > self.file_len {
            return Err(TileError::InvalidRasterFormat(format!(
                "read of {}..{} beyond file of {} bytes",
                offset,
                offset + length,
                self.file_len
            )));
        }
        self.source.read_range(offset, length).await
    }
}

#[derive(Debug, Clone)]
struct RawEntry {
    field_type: u16,
    count: u64,
    /// The raw 4 value/offset bytes.
    inline: [u8; 4],
}

fn type_size(field_type: u16) -> u64 {
    match field_type {
        1 | 2 | 6 | 7 => 1, // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => 2,         // SHORT, SSHORT
        4 | 9 | 11 => 4,    // LONG, SLONG, FLOAT
        5 | 10 | 12 => 8,   // RATIONAL, SRATIONAL, DOUBLE
        _ => 0,
    }
}

struct EntryReader<'a> {
    fetcher: &'a Fetcher<'a>,
    endian: Endian,
}

impl<'a> EntryReader<'a> {
    /// Raw bytes of an entry's value, inline or out-of-line.
    async fn value_bytes(&self, entry: &RawEntry) -> TileResult<Bytes> {
        let size = type_size(entry.field_type) * entry.count;
        if size == 0 {
            return Err(TileError::InvalidRasterFormat(format!(
                "unsupported field type {}",
                entry.field_type
            )));
        }
        if size <= 4 {
            return Ok(Bytes::copy_from_slice(&entry.inline[..size as usize]));
        }
        let offset = self.endian.u32(&entry.inline) as u64;
        self.fetcher.get(offset, size).await
    }

    async fn unsigned_vec(&self, entry: &RawEntry) -> TileResult<Vec<u64>> {
        let bytes = self.value_bytes(entry).await?;
        let step = type_size(entry.field_type) as usize;
        let mut out = Vec::with_capacity(entry.count as usize);
        for chunk in bytes.chunks_exact(step) {
            out.push(match entry.field_type {
                1 => chunk[0] as u64,
                3 => self.endian.u16(chunk) as u64,
                4 => self.endian.u32(chunk) as u64,
                other => {
                    return Err(TileError::InvalidRasterFormat(format!(
                        "expected unsigned integer tag, got type {}",
                        other
                    )))
                }
            });
        }
        Ok(out)
    }

    async fn unsigned(&self, entry: &RawEntry) -> TileResult<u64> {
        self.unsigned_vec(entry)
            .await?
            .first()
            .copied()
            .ok_or_else(|| TileError::InvalidRasterFormat("empty tag value".into()))
    }

    async fn double_vec(&self, entry: &RawEntry) -> TileResult<Vec<f64>> {
        if entry.field_type != 12 {
            return Err(TileError::InvalidRasterFormat(format!(
                "expected DOUBLE tag, got type {}",
                entry.field_type
            )));
        }
        let bytes = self.value_bytes(entry).await?;
        Ok(bytes.chunks_exact(8).map(|c| self.endian.f64(c)).collect())
    }
}

/// Parse a cloud-optimized TIFF's structure from a range source.
pub async fn parse_tiff(source: &Arc<dyn RangeSource>) -> TileResult<TiffMetadata> {
    let validator = source.validator().await?;
    let file_len = validator.content_length.ok_or_else(|| {
        TileError::UpstreamUnreachable("source did not report a content length".into())
    })?;

    if file_len < 8 {
        return Err(TileError::InvalidRasterFormat("file too short".into()));
    }

    let window_len = INITIAL_WINDOW.min(file_len);
    let window = source.read_range(0, window_len).await?;

    let endian = match &window[0..2] {
        b"II" => Endian { little: true },
        b"MM" => Endian { little: false },
        _ => {
            return Err(TileError::InvalidRasterFormat(
                "bad byte-order signature".into(),
            ))
        }
    };

    let magic = endian.u16(&window[2..4]);
    if magic == 43 {
        return Err(TileError::InvalidRasterFormat(
            "BigTIFF layout not supported".into(),
        ));
    }
    if magic != 42 {
        return Err(TileError::InvalidRasterFormat(format!(
            "bad magic number {}",
            magic
        )));
    }

    let fetcher = Fetcher {
        source,
        window,
        file_len,
    };
    let entry_reader = EntryReader {
        fetcher: &fetcher,
        endian,
    };

    let mut ifd_offset = endian.u32(&fetcher.window[4..8]) as u64;
    let mut ifds = Vec::new();
    let mut pixel_scale: Option<Vec<f64>> = None;
    let mut tiepoint: Option<Vec<f64>> = None;
    let mut transformation: Option<Vec<f64>> = None;
    let mut epsg = 0u32;

    while ifd_offset != 0 && ifds.len() < MAX_IFDS {
        let count_bytes = fetcher.get(ifd_offset, 2).await?;
        let entry_count = endian.u16(&count_bytes) as u64;

        let entries_bytes = fetcher.get(ifd_offset + 2, entry_count * 12 + 4).await?;

        let mut width = 0u64;
        let mut height = 0u64;
        let mut samples: u16 = 1;
        let mut bits: u16 = 8;
        let mut compression: u16 = COMPRESSION_NONE;
        let mut photometric: u16 = 1;
        let mut planar: u16 = 1;
        let mut tile_width = 0u64;
        let mut tile_height = 0u64;
        let mut tile_offsets = Vec::new();
        let mut tile_byte_counts = Vec::new();

        for i in 0..entry_count as usize {
            let raw = &entries_bytes[i * 12..i * 12 + 12];
            let tag = endian.u16(&raw[0..2]);
            let entry = RawEntry {
                field_type: endian.u16(&raw[2..4]),
                count: endian.u32(&raw[4..8]) as u64,
                inline: raw[8..12].try_into().expect("4 bytes"),
            };

            match tag {
                TAG_IMAGE_WIDTH => width = entry_reader.unsigned(&entry).await?,
                TAG_IMAGE_LENGTH => height = entry_reader.unsigned(&entry).await?,
                TAG_BITS_PER_SAMPLE => {
                    bits = entry_reader.unsigned(&entry).await? as u16;
                }
                TAG_COMPRESSION => compression = entry_reader.unsigned(&entry).await? as u16,
                TAG_PHOTOMETRIC => photometric = entry_reader.unsigned(&entry).await? as u16,
                TAG_SAMPLES_PER_PIXEL => {
                    samples = entry_reader.unsigned(&entry).await? as u16;
                }
                TAG_PLANAR_CONFIG => planar = entry_reader.unsigned(&entry).await? as u16,
                TAG_TILE_WIDTH => tile_width = entry_reader.unsigned(&entry).await?,
                TAG_TILE_LENGTH => tile_height = entry_reader.unsigned(&entry).await?,
                TAG_TILE_OFFSETS => {
                    tile_offsets = entry_reader.unsigned_vec(&entry).await?;
                }
                TAG_TILE_BYTE_COUNTS => {
                    tile_byte_counts = entry_reader.unsigned_vec(&entry).await?;
                }
                TAG_MODEL_PIXEL_SCALE if ifds.is_empty() => {
                    pixel_scale = Some(entry_reader.double_vec(&entry).await?);
                }
                TAG_MODEL_TIEPOINT if ifds.is_empty() => {
                    tiepoint = Some(entry_reader.double_vec(&entry).await?);
                }
                TAG_MODEL_TRANSFORMATION if ifds.is_empty() => {
                    transformation = Some(entry_reader.double_vec(&entry).await?);
                }
                TAG_GEO_KEY_DIRECTORY if ifds.is_empty() => {
                    let keys = entry_reader.unsigned_vec(&entry).await?;
                    epsg = extract_epsg(&keys);
                }
                _ => {}
            }
        }

        if planar != 1 {
            return Err(TileError::InvalidRasterFormat(
                "planar sample layout not supported".into(),
            ));
        }
        if bits != 8 {
            return Err(TileError::InvalidRasterFormat(format!(
                "only 8-bit samples supported, got {}",
                bits
            )));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(TileError::InvalidRasterFormat(
                "raster is not internally tiled".into(),
            ));
        }
        if tile_offsets.len() != tile_byte_counts.len() {
            return Err(TileError::InvalidRasterFormat(
                "tile offset/byte-count tables disagree".into(),
            ));
        }

        ifds.push(TiffIfd {
            width,
            height,
            samples_per_pixel: samples,
            bits_per_sample: bits,
            compression,
            photometric,
            tile_width,
            tile_height,
            tile_offsets,
            tile_byte_counts,
        });

        let next_offset_pos = entry_count as usize * 12;
        ifd_offset = endian.u32(&entries_bytes[next_offset_pos..next_offset_pos + 4]) as u64;
    }

    if ifds.is_empty() {
        return Err(TileError::InvalidRasterFormat("no IFDs".into()));
    }

    let geo_transform = match (&pixel_scale, &tiepoint, &transformation) {
        (Some(scale), Some(tiepoint), _) => {
            GeoTransform::from_scale_and_tiepoint(scale, tiepoint)
        }
        (_, _, Some(matrix)) => GeoTransform::from_transformation(matrix),
        _ => None,
    }
    .ok_or_else(|| TileError::InvalidRasterFormat("missing georeferencing tags".into()))?;

    if epsg == 0 {
        return Err(TileError::InvalidRasterFormat(
            "missing GeoKey directory".into(),
        ));
    }

    Ok(TiffMetadata {
        ifds,
        geo_transform,
        epsg,
    })
}

/// Pull the CRS code out of a GeoKeyDirectory short array. Keys are
/// quads of (key id, location, count, value); a location of 0 means
/// the value is stored inline.
fn extract_epsg(keys: &[u64]) -> u32 {
    if keys.len() < 4 {
        return 0;
    }

    let mut geographic = 0u32;
    let mut projected = 0u32;

    for quad in keys[4..].chunks_exact(4) {
        let (key, location, value) = (quad[0] as u16, quad[1], quad[3] as u32);
        if location != 0 {
            continue;
        }
        match key {
            KEY_GEOGRAPHIC_TYPE => geographic = value,
            KEY_PROJECTED_CS_TYPE => projected = value,
            _ => {}
        }
    }

    // A projected CRS wins when both are present.
    if projected != 0 {
        projected
    } else {
        geographic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_cog, CogSpec};
    use storage::MemoryRangeSource;

    fn source_for(bytes: Vec<u8>) -> Arc<dyn RangeSource> {
        Arc::new(MemoryRangeSource::new(bytes, "mem://test.tif"))
    }

    #[tokio::test]
    async fn test_parse_gray_cog() {
        let spec = CogSpec::gray_gradient(32, 32, 16);
        let source = source_for(build_cog(&spec));

        let metadata = parse_tiff(&source).await.unwrap();
        assert_eq!(metadata.ifds.len(), 1);
        assert_eq!(metadata.full().width, 32);
        assert_eq!(metadata.full().samples_per_pixel, 1);
        assert_eq!(metadata.full().tile_offsets.len(), 4);
        assert_eq!(metadata.epsg, 4326);

        // Tiepoint (0,0) -> (139.5, 36.0), scale 0.01/pixel
        let (col, row) = metadata.geo_transform.world_to_pixel(139.5, 36.0);
        assert!((col - 0.0).abs() < 1e-9);
        assert!((row - 0.0).abs() < 1e-9);
        let (col, row) = metadata.geo_transform.world_to_pixel(139.66, 35.84);
        assert!((col - 16.0).abs() < 1e-9);
        assert!((row - 16.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_parse_rgb_with_overview() {
        let mut spec = CogSpec::rgb_quadrants(64, 64, 16);
        spec.overviews = 1;
        let source = source_for(build_cog(&spec));

        let metadata = parse_tiff(&source).await.unwrap();
        assert_eq!(metadata.ifds.len(), 2);
        assert_eq!(metadata.full().samples_per_pixel, 3);
        assert_eq!(metadata.ifds[1].width, 32);
        assert!((metadata.reduction_factor(1) - 2.0).abs() < 1e-9);

        // Overview pixels are twice as coarse
        let overview_transform = metadata.transform_for(1);
        assert!((overview_transform.a - metadata.geo_transform.a * 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_non_tiff_rejected() {
        let source = source_for(b"PMTiles\x03not a tiff at all padding padding".to_vec());
        let err = parse_tiff(&source).await.unwrap_err();
        assert!(matches!(err, TileError::InvalidRasterFormat(_)));
    }

    #[tokio::test]
    async fn test_bigtiff_rejected() {
        let mut bytes = build_cog(&CogSpec::gray_gradient(32, 32, 16));
        bytes[2] = 43; // BigTIFF magic (little-endian low byte)
        bytes[3] = 0;
        let source = source_for(bytes);
        let err = parse_tiff(&source).await.unwrap_err();
        assert!(matches!(err, TileError::InvalidRasterFormat(_)));
    }

    #[test]
    fn test_extract_epsg_prefers_projected() {
        // Header quad + geographic + projected keys
        let keys = [
            1, 1, 0, 2, // directory header
            KEY_GEOGRAPHIC_TYPE as u64, 0, 1, 4326,
            KEY_PROJECTED_CS_TYPE as u64, 0, 1, 3857,
        ];
        assert_eq!(extract_epsg(&keys), 3857);

        let geographic_only = [1, 1, 0, 1, KEY_GEOGRAPHIC_TYPE as u64, 0, 1, 4326];
        assert_eq!(extract_epsg(&geographic_only), 4326);
    }

    #[test]
    fn test_geotransform_roundtrip() {
        let gt = GeoTransform {
            a: 0.01,
            c: 139.5,
            e: -0.01,
            f: 36.0,
        };
        let (col, row) = gt.world_to_pixel(139.77, 35.78);
        let (x, y) = gt.pixel_to_world(col, row);
        assert!((x - 139.77).abs() < 1e-12);
        assert!((y - 35.78).abs() < 1e-12);
    }
}
