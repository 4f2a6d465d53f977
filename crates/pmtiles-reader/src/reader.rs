//! Archive reader with a cached, revalidating root directory.

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use flate2::read::GzDecoder;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use storage::{RangeSource, SingleFlightCache, SourceValidator};
use tile_common::{TileError, TileResult};

use crate::directory::{decode_directory, find_entry, DirEntry};
use crate::header::{ArchiveHeader, Compression, HEADER_SIZE};
use crate::tile_id::tile_id;

/// How long a cached directory is trusted before the upstream
/// validator is checked again.
const DEFAULT_REVALIDATE_AFTER: Duration = Duration::from_secs(60);

/// Decoded archive state shared across requests. The directory and
/// metadata are behind `Arc` so revalidation can refresh the
/// timestamp without copying them.
#[derive(Clone)]
pub struct CachedArchive {
    pub header: ArchiveHeader,
    pub root: Arc<Vec<DirEntry>>,
    pub metadata: Arc<Value>,
    pub validator: SourceValidator,
    fetched_at: Instant,
}

/// Lightweight descriptive metadata extracted by the prober.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub tile_type: String,
    pub compression: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub bounds: [f64; 4],
    pub layer_count: usize,
}

/// Reads tiles out of single-file archives via byte-range access.
///
/// The decoded root directory is cached per source URL; concurrent
/// cold opens of the same archive collapse into one upstream fetch.
pub struct ArchiveReader {
    cache: SingleFlightCache<CachedArchive>,
    revalidate_after: Duration,
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveReader {
    pub fn new() -> Self {
        Self {
            cache: SingleFlightCache::new(),
            revalidate_after: DEFAULT_REVALIDATE_AFTER,
        }
    }

    /// Override the revalidation interval (tests use zero).
    pub fn with_revalidate_after(revalidate_after: Duration) -> Self {
        Self {
            cache: SingleFlightCache::new(),
            revalidate_after,
        }
    }

    /// Open an archive: validate the header and return the cached
    /// directory state, fetching it if needed.
    pub async fn open(&self, source: &Arc<dyn RangeSource>) -> TileResult<Arc<CachedArchive>> {
        let key = source.url().to_string();

        if let Some(hit) = self.cache.get(&key).await {
            if hit.fetched_at.elapsed() < self.revalidate_after {
                return Ok(hit);
            }

            // Stale enough to check the upstream validator. Unchanged
            // means just refresh the timestamp; changed means decode
            // from scratch.
            let current = source.validator().await?;
            if current == hit.validator {
                let refreshed = CachedArchive {
                    fetched_at: Instant::now(),
                    ..(*hit).clone()
                };
                return Ok(self.cache.insert(&key, refreshed).await);
            }
            debug!(url = %key, "archive changed upstream, reloading directory");
            self.cache.invalidate(&key).await;
        }

        let source = source.clone();
        self.cache
            .get_or_load(&key, move || async move { load_archive(&source).await })
            .await
    }

    /// Read and decompress one tile. A (z, x, y) absent from the
    /// directory is `TileNotFound` — normal for sparse coverage.
    pub async fn read_tile(
        &self,
        source: &Arc<dyn RangeSource>,
        z: u8,
        x: u32,
        y: u32,
    ) -> TileResult<Bytes> {
        let archive = self.open(source).await?;
        let header = &archive.header;
        let target = tile_id(z, x, y);

        let mut entries: Arc<Vec<DirEntry>> = archive.root.clone();
        let mut hopped_leaf = false;

        loop {
            let entry = match find_entry(&entries, target) {
                Some(entry) => entry.clone(),
                None => return Err(TileError::TileNotFound),
            };

            if entry.is_leaf() {
                if hopped_leaf {
                    return Err(TileError::InvalidArchiveFormat(
                        "nested leaf directories".into(),
                    ));
                }
                let raw = source
                    .read_range(header.leaf_offset + entry.offset, entry.length as u64)
                    .await?;
                let decoded = decompress(&raw, header.internal_compression)?;
                entries = Arc::new(decode_directory(&decoded)?);
                hopped_leaf = true;
                continue;
            }

            let raw = source
                .read_range(header.data_offset + entry.offset, entry.length as u64)
                .await?;
            let tile = decompress(&raw, header.tile_compression)?;
            return Ok(Bytes::from(tile));
        }
    }

    /// Extract descriptive metadata for the connectivity probe.
    pub async fn probe(&self, source: &Arc<dyn RangeSource>) -> TileResult<ArchiveInfo> {
        let archive = self.open(source).await?;
        let header = &archive.header;

        let layer_count = archive
            .metadata
            .get("vector_layers")
            .and_then(|v| v.as_array())
            .map(|layers| layers.len())
            .unwrap_or(0);

        Ok(ArchiveInfo {
            tile_type: header.tile_type.name().to_string(),
            compression: header.tile_compression.name().to_string(),
            min_zoom: header.min_zoom,
            max_zoom: header.max_zoom,
            bounds: header.bounds,
            layer_count,
        })
    }

    /// Drop the cached directory for a URL.
    pub async fn invalidate(&self, url: &str) {
        self.cache.invalidate(url).await;
    }
}

async fn load_archive(source: &Arc<dyn RangeSource>) -> TileResult<CachedArchive> {
    let validator = source.validator().await?;

    let header_bytes = source.read_range(0, HEADER_SIZE as u64).await?;
    let header = ArchiveHeader::parse(&header_bytes)?;

    let root_raw = source
        .read_range(header.root_offset, header.root_length)
        .await?;
    let root_decoded = decompress(&root_raw, header.internal_compression)?;
    let root = decode_directory(&root_decoded)?;

    let metadata = if header.metadata_length > 0 {
        let raw = source
            .read_range(header.metadata_offset, header.metadata_length)
            .await?;
        let decoded = decompress(&raw, header.internal_compression)?;
        serde_json::from_slice(&decoded).map_err(|e| {
            TileError::InvalidArchiveFormat(format!("metadata is not valid JSON: {}", e))
        })?
    } else {
        Value::Null
    };

    debug!(
        url = %source.url(),
        entries = root.len(),
        "decoded archive root directory"
    );

    Ok(CachedArchive {
        header,
        root: Arc::new(root),
        metadata: Arc::new(metadata),
        validator,
        fetched_at: Instant::now(),
    })
}

fn decompress(data: &[u8], compression: Compression) -> TileResult<Vec<u8>> {
    match compression {
        Compression::None | Compression::Unknown => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut decoder = GzDecoder::new(data);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| {
                TileError::InvalidArchiveFormat(format!("gzip decompression failed: {}", e))
            })?;
            Ok(out)
        }
        other => Err(TileError::InvalidArchiveFormat(format!(
            "unsupported tile compression: {}",
            other.name()
        ))),
    }
}
