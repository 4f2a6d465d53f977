//! URL-keyed cache with single-flight loading.
//!
//! Used for the archive root-directory cache and the raster metadata
//! cache. Reads are lock-free clones of an `Arc` snapshot; a refresh
//! replaces the snapshot (copy-on-write swap). When several requests
//! miss on the same key at once, only one performs the upstream fetch;
//! the rest wait on a broadcast of its result. No lock is held across
//! the loader's await.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use tile_common::{TileError, TileResult};

type InFlightMap<V> = StdMutex<HashMap<String, broadcast::Sender<Result<Arc<V>, String>>>>;

/// A concurrent map of decoded upstream state, keyed by source URL.
pub struct SingleFlightCache<V> {
    entries: RwLock<HashMap<String, Arc<V>>>,
    in_flight: InFlightMap<V>,
}

impl<V: Send + Sync + 'static> Default for SingleFlightCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync + 'static> SingleFlightCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    /// Current snapshot for a key, if any.
    pub async fn get(&self, key: &str) -> Option<Arc<V>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Drop a key so the next access reloads it.
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
        debug!(key, "cache entry invalidated");
    }

    /// Replace the snapshot for a key.
    pub async fn insert(&self, key: &str, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        value
    }

    /// Return the cached value, or run `loader` to produce it. If a
    /// load for the same key is already in flight the call waits for
    /// that result instead of fetching again.
    pub async fn get_or_load<F, Fut>(&self, key: &str, loader: F) -> TileResult<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TileResult<V>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        // Either join an in-flight load or register as the loader.
        let mut rx = {
            let mut in_flight = self.in_flight.lock().expect("in-flight map poisoned");
            if let Some(tx) = in_flight.get(key) {
                Some(tx.subscribe())
            } else {
                let (tx, _) = broadcast::channel(16);
                in_flight.insert(key.to_string(), tx);
                None
            }
        };

        if let Some(rx) = rx.as_mut() {
            return match rx.recv().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(TileError::UpstreamUnreachable(message)),
                Err(_) => Err(TileError::Internal(
                    "coalesced cache load was abandoned".into(),
                )),
            };
        }

        let result = loader().await;

        let tx = self
            .in_flight
            .lock()
            .expect("in-flight map poisoned")
            .remove(key);

        match result {
            Ok(value) => {
                let value = self.insert(key, value).await;
                if let Some(tx) = tx {
                    let _ = tx.send(Ok(value.clone()));
                }
                Ok(value)
            }
            Err(err) => {
                // Failed loads are not published; waiters get the error.
                if let Some(tx) = tx {
                    let _ = tx.send(Err(err.to_string()));
                }
                Err(err)
            }
        }
    }
}
