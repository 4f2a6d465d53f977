//! Archive header parsing.
//!
//! The archive begins with a fixed 127-byte little-endian header:
//! a 7-byte magic, a version byte, the offsets and lengths of the
//! root directory, JSON metadata, leaf directory and tile data
//! sections, entry counts, compression/type tags, and zoom/bounds
//! hints for discovery.

use tile_common::{TileError, TileResult};

/// Magic signature at offset 0.
pub const MAGIC: &[u8; 7] = b"PMTiles";

/// The one directory layout version this reader speaks.
pub const VERSION: u8 = 3;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 127;

/// Compression applied to tile payloads and internal sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Unknown,
    None,
    Gzip,
    Brotli,
    Zstd,
}

impl Compression {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Compression::None,
            2 => Compression::Gzip,
            3 => Compression::Brotli,
            4 => Compression::Zstd,
            _ => Compression::Unknown,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Compression::Unknown => 0,
            Compression::None => 1,
            Compression::Gzip => 2,
            Compression::Brotli => 3,
            Compression::Zstd => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::Unknown => "unknown",
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Brotli => "brotli",
            Compression::Zstd => "zstd",
        }
    }
}

/// Payload type of the archived tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileType {
    Unknown,
    Mvt,
    Png,
    Jpeg,
    Webp,
}

impl TileType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => TileType::Mvt,
            2 => TileType::Png,
            3 => TileType::Jpeg,
            4 => TileType::Webp,
            _ => TileType::Unknown,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            TileType::Unknown => 0,
            TileType::Mvt => 1,
            TileType::Png => 2,
            TileType::Jpeg => 3,
            TileType::Webp => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TileType::Unknown => "unknown",
            TileType::Mvt => "mvt",
            TileType::Png => "png",
            TileType::Jpeg => "jpeg",
            TileType::Webp => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            TileType::Mvt => "application/x-protobuf",
            TileType::Png => "image/png",
            TileType::Jpeg => "image/jpeg",
            TileType::Webp => "image/webp",
            TileType::Unknown => "application/octet-stream",
        }
    }
}

/// Decoded archive header.
#[derive(Debug, Clone)]
pub struct ArchiveHeader {
    pub root_offset: u64,
    pub root_length: u64,
    pub metadata_offset: u64,
    pub metadata_length: u64,
    pub leaf_offset: u64,
    pub leaf_length: u64,
    pub data_offset: u64,
    pub data_length: u64,
    pub n_addressed_tiles: u64,
    pub n_tile_entries: u64,
    pub n_tile_contents: u64,
    pub clustered: bool,
    pub internal_compression: Compression,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Bounds in degrees, stored as 1e-7-degree integers on disk.
    pub bounds: [f64; 4],
    pub center_zoom: u8,
    pub center: [f64; 2],
}

impl ArchiveHeader {
    /// Parse and validate the fixed-size header. The magic and
    /// version must match; anything else is a malformed or foreign
    /// file, not a missing tile.
    pub fn parse(buf: &[u8]) -> TileResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(TileError::InvalidArchiveFormat(format!(
                "header too short: {} bytes",
                buf.len()
            )));
        }
        if &buf[0..7] != MAGIC {
            return Err(TileError::InvalidArchiveFormat(
                "bad magic signature".into(),
            ));
        }
        let version = buf[7];
        if version != VERSION {
            return Err(TileError::InvalidArchiveFormat(format!(
                "unsupported archive version {}",
                version
            )));
        }

        let u64_at = |offset: usize| {
            u64::from_le_bytes(buf[offset..offset + 8].try_into().expect("8 bytes"))
        };
        let i32_at = |offset: usize| {
            i32::from_le_bytes(buf[offset..offset + 4].try_into().expect("4 bytes"))
        };
        let degrees = |offset: usize| i32_at(offset) as f64 / 1e7;

        Ok(Self {
            root_offset: u64_at(8),
            root_length: u64_at(16),
            metadata_offset: u64_at(24),
            metadata_length: u64_at(32),
            leaf_offset: u64_at(40),
            leaf_length: u64_at(48),
            data_offset: u64_at(56),
            data_length: u64_at(64),
            n_addressed_tiles: u64_at(72),
            n_tile_entries: u64_at(80),
            n_tile_contents: u64_at(88),
            clustered: buf[96] == 1,
            internal_compression: Compression::from_u8(buf[97]),
            tile_compression: Compression::from_u8(buf[98]),
            tile_type: TileType::from_u8(buf[99]),
            min_zoom: buf[100],
            max_zoom: buf[101],
            bounds: [degrees(102), degrees(106), degrees(110), degrees(114)],
            center_zoom: buf[118],
            center: [degrees(119), degrees(123)],
        })
    }

    /// Serialize back to the 127-byte wire form. The readers' tests
    /// build synthetic archives with this.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);

        for value in [
            self.root_offset,
            self.root_length,
            self.metadata_offset,
            self.metadata_length,
            self.leaf_offset,
            self.leaf_length,
            self.data_offset,
            self.data_length,
            self.n_addressed_tiles,
            self.n_tile_entries,
            self.n_tile_contents,
        ] {
            buf.extend_from_slice(&value.to_le_bytes());
        }

        buf.push(self.clustered as u8);
        buf.push(self.internal_compression.as_u8());
        buf.push(self.tile_compression.as_u8());
        buf.push(self.tile_type.as_u8());
        buf.push(self.min_zoom);
        buf.push(self.max_zoom);
        for degrees in self.bounds {
            buf.extend_from_slice(&((degrees * 1e7) as i32).to_le_bytes());
        }
        buf.push(self.center_zoom);
        for degrees in self.center {
            buf.extend_from_slice(&((degrees * 1e7) as i32).to_le_bytes());
        }

        debug_assert_eq!(buf.len(), HEADER_SIZE);
        buf
    }
}
