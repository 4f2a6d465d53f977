//! Byte-range access to remote tile archives and rasters.
//!
//! Both binary readers (archive directories, raster tile blocks) fetch
//! exact byte ranges rather than whole files. A [`RangeSource`] hides
//! where the bytes live: HTTP(S) origins, S3-compatible object stores,
//! or local files for fixtures. Concurrent reads against one origin are
//! bounded by a per-origin semaphore so a slow upstream cannot absorb
//! the whole worker pool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, path::Path as ObjectPath, ObjectStore};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tracing::debug;

use tile_common::{TileError, TileResult};

/// Default concurrent in-flight range reads per origin.
const DEFAULT_PERMITS_PER_ORIGIN: usize = 8;

/// Upstream freshness signal used to invalidate cached directory and
/// metadata entries when the remote object changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceValidator {
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Random access reads over a single remote object.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// The URL this source reads from (cache key).
    fn url(&self) -> &str;

    /// Fetch exactly `length` bytes starting at `start`.
    async fn read_range(&self, start: u64, length: u64) -> TileResult<Bytes>;

    /// Fetch the upstream validator without reading the body.
    async fn validator(&self) -> TileResult<SourceValidator>;
}

// ============================================================================
// HTTP
// ============================================================================

/// Byte-range reads against an HTTP(S) origin.
pub struct HttpRangeSource {
    client: reqwest::Client,
    url: String,
    semaphore: Arc<Semaphore>,
}

impl HttpRangeSource {
    pub fn new(client: reqwest::Client, url: String, semaphore: Arc<Semaphore>) -> Self {
        Self {
            client,
            url,
            semaphore,
        }
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn read_range(&self, start: u64, length: u64) -> TileResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let _permit = self.semaphore.acquire().await.map_err(|_| {
            TileError::Internal("range source semaphore closed".into())
        })?;

        let end = start + length - 1;
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, format!("bytes={}-{}", start, end))
            .send()
            .await
            .map_err(|e| TileError::UpstreamUnreachable(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TileError::UpstreamUnreachable(format!(
                "{}: HTTP {}",
                self.url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TileError::UpstreamUnreachable(format!("{}: {}", self.url, e)))?;

        debug!(url = %self.url, start, length, got = body.len(), "range read");

        // Some origins ignore Range and return the whole object.
        if status == reqwest::StatusCode::OK && body.len() as u64 > length {
            let start = start as usize;
            let end = (start + length as usize).min(body.len());
            return Ok(body.slice(start..end));
        }

        Ok(body)
    }

    async fn validator(&self) -> TileResult<SourceValidator> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| TileError::UpstreamUnreachable(format!("{}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(TileError::UpstreamUnreachable(format!(
                "{}: HTTP {}",
                self.url,
                response.status()
            )));
        }

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        Ok(SourceValidator {
            content_length: header(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.parse().ok()),
            etag: header(reqwest::header::ETAG),
            last_modified: header(reqwest::header::LAST_MODIFIED),
        })
    }
}

// ============================================================================
// S3
// ============================================================================

/// Byte-range reads against an S3-compatible object store.
pub struct S3RangeSource {
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    url: String,
    semaphore: Arc<Semaphore>,
}

impl S3RangeSource {
    /// Build from an `s3://bucket/key` URL. Endpoint and credentials
    /// come from the environment (AWS_* variables).
    pub fn from_url(url: &str, semaphore: Arc<Semaphore>) -> TileResult<Self> {
        let rest = url.strip_prefix("s3://").ok_or_else(|| {
            TileError::StorageError(format!("not an s3 url: {}", url))
        })?;
        let (bucket, key) = rest.split_once('/').ok_or_else(|| {
            TileError::StorageError(format!("s3 url missing key: {}", url))
        })?;

        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| TileError::StorageError(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            path: ObjectPath::from(key),
            url: url.to_string(),
            semaphore,
        })
    }
}

#[async_trait]
impl RangeSource for S3RangeSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn read_range(&self, start: u64, length: u64) -> TileResult<Bytes> {
        let _permit = self.semaphore.acquire().await.map_err(|_| {
            TileError::Internal("range source semaphore closed".into())
        })?;

        self.store
            .get_range(&self.path, start as usize..(start + length) as usize)
            .await
            .map_err(|e| TileError::UpstreamUnreachable(format!("{}: {}", self.url, e)))
    }

    async fn validator(&self) -> TileResult<SourceValidator> {
        let meta = self
            .store
            .head(&self.path)
            .await
            .map_err(|e| TileError::UpstreamUnreachable(format!("{}: {}", self.url, e)))?;

        Ok(SourceValidator {
            content_length: Some(meta.size as u64),
            etag: meta.e_tag,
            last_modified: Some(meta.last_modified.to_rfc3339()),
        })
    }
}

// ============================================================================
// Local file
// ============================================================================

/// Byte-range reads from a local file. Used for fixtures and tests.
pub struct FileRangeSource {
    path: PathBuf,
    url: String,
}

impl FileRangeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let url = format!("file://{}", path.display());
        Self { path, url }
    }
}

#[async_trait]
impl RangeSource for FileRangeSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn read_range(&self, start: u64, length: u64) -> TileResult<Bytes> {
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| TileError::UpstreamUnreachable(format!("{}: {}", self.url, e)))?;

        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| TileError::StorageError(format!("seek failed: {}", e)))?;

        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| TileError::StorageError(format!("short read: {}", e)))?;

        Ok(Bytes::from(buf))
    }

    async fn validator(&self) -> TileResult<SourceValidator> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| TileError::UpstreamUnreachable(format!("{}: {}", self.url, e)))?;

        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs().to_string());

        Ok(SourceValidator {
            content_length: Some(meta.len()),
            etag: None,
            last_modified: modified,
        })
    }
}

// ============================================================================
// In-memory (tests)
// ============================================================================

/// An in-memory source, for unit tests of the binary readers.
pub struct MemoryRangeSource {
    data: Bytes,
    url: String,
}

impl MemoryRangeSource {
    pub fn new(data: impl Into<Bytes>, url: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl RangeSource for MemoryRangeSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn read_range(&self, start: u64, length: u64) -> TileResult<Bytes> {
        let start = start as usize;
        let end = start + length as usize;
        if end > self.data.len() {
            return Err(TileError::StorageError(format!(
                "range {}..{} beyond object of {} bytes",
                start,
                end,
                self.data.len()
            )));
        }
        Ok(self.data.slice(start..end))
    }

    async fn validator(&self) -> TileResult<SourceValidator> {
        Ok(SourceValidator {
            content_length: Some(self.data.len() as u64),
            etag: None,
            last_modified: None,
        })
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Builds range sources from datasource URLs, handing each origin a
/// shared concurrency-bounding semaphore.
pub struct RangeSourceFactory {
    client: reqwest::Client,
    permits_per_origin: usize,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for RangeSourceFactory {
    fn default() -> Self {
        Self::new(DEFAULT_PERMITS_PER_ORIGIN)
    }
}

impl RangeSourceFactory {
    pub fn new(permits_per_origin: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            permits_per_origin,
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore_for(&self, origin: &str) -> Arc<Semaphore> {
        let mut map = self.semaphores.lock().expect("semaphore map poisoned");
        map.entry(origin.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.permits_per_origin)))
            .clone()
    }

    /// Open a source for a datasource URL. Supported schemes:
    /// `http(s)://`, `s3://`, `file://` and bare paths.
    pub fn open(&self, url: &str) -> TileResult<Arc<dyn RangeSource>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let origin = url.split('/').take(3).collect::<Vec<_>>().join("/");
            Ok(Arc::new(HttpRangeSource::new(
                self.client.clone(),
                url.to_string(),
                self.semaphore_for(&origin),
            )))
        } else if url.starts_with("s3://") {
            let origin = url.split('/').take(3).collect::<Vec<_>>().join("/");
            Ok(Arc::new(S3RangeSource::from_url(
                url,
                self.semaphore_for(&origin),
            )?))
        } else if let Some(path) = url.strip_prefix("file://") {
            Ok(Arc::new(FileRangeSource::new(path)))
        } else if url.starts_with('/') {
            Ok(Arc::new(FileRangeSource::new(url)))
        } else {
            Err(TileError::StorageError(format!(
                "unsupported datasource url scheme: {}",
                url
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_memory_range_source() {
        let source = MemoryRangeSource::new(&b"hello world"[..], "mem://test");
        let bytes = source.read_range(6, 5).await.unwrap();
        assert_eq!(&bytes[..], b"world");

        assert!(source.read_range(6, 100).await.is_err());

        let validator = source.validator().await.unwrap();
        assert_eq!(validator.content_length, Some(11));
    }

    #[tokio::test]
    async fn test_file_range_source() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let source = FileRangeSource::new(tmp.path());
        let bytes = source.read_range(2, 4).await.unwrap();
        assert_eq!(&bytes[..], b"2345");

        let validator = source.validator().await.unwrap();
        assert_eq!(validator.content_length, Some(10));
    }

    #[test]
    fn test_factory_scheme_dispatch() {
        let factory = RangeSourceFactory::default();
        assert!(factory.open("https://tiles.example.com/a.pmtiles").is_ok());
        assert!(factory.open("file:///tmp/archive.pmtiles").is_ok());
        assert!(factory.open("/tmp/archive.pmtiles").is_ok());
        assert!(factory.open("gopher://nope").is_err());
    }

    #[test]
    fn test_factory_shares_origin_semaphores() {
        let factory = RangeSourceFactory::new(2);
        let a = factory.semaphore_for("https://tiles.example.com");
        let b = factory.semaphore_for("https://tiles.example.com");
        let c = factory.semaphore_for("https://other.example.com");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
