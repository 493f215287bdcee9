//! Single-flight LRU cache of detection results.
//!
//! Keyed by perceptual frame fingerprint so near-identical frames reuse one
//! inference. Concurrent lookups for a key that is being computed wait on the
//! same `watch` channel instead of starting a second computation.
//!
//! In-flight computations are tracked separately and do not count toward
//! capacity. If the computing future is dropped, its waiters are released
//! with an error and nothing is cached.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lens_models::DetectionBatch;
use lens_vision::FrameKey;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::config::CacheConfig;
use crate::metrics;

/// A computation for a key failed or was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CacheComputeError(pub String);

impl CacheComputeError {
    fn abandoned() -> Self {
        Self("computation abandoned before completing".to_string())
    }
}

type Outcome = Result<Arc<DetectionBatch>, CacheComputeError>;

struct ReadyEntry {
    batch: Arc<DetectionBatch>,
    last_access: u64,
}

#[derive(Default)]
struct CacheInner {
    ready: HashMap<FrameKey, ReadyEntry>,
    pending: HashMap<FrameKey, watch::Receiver<Option<Outcome>>>,
    tick: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &FrameKey) -> Option<Arc<DetectionBatch>> {
        let tick = self.next_tick();
        let entry = self.ready.get_mut(key)?;
        entry.last_access = tick;
        Some(Arc::clone(&entry.batch))
    }

    fn insert(&mut self, key: FrameKey, batch: Arc<DetectionBatch>, capacity: usize) {
        let tick = self.next_tick();
        self.ready.insert(
            key,
            ReadyEntry {
                batch,
                last_access: tick,
            },
        );

        while self.ready.len() > capacity {
            let Some(oldest) = self
                .ready
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| *key)
            else {
                break;
            };
            self.ready.remove(&oldest);
            debug!(key = %oldest, "Evicted least recently used cache entry");
        }
    }
}

enum Role {
    Leader(watch::Sender<Option<Outcome>>),
    Waiter(watch::Receiver<Option<Outcome>>),
}

/// LRU result cache with per-key single-flight computation.
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: config.capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached batch for `key`, computing it at most once.
    ///
    /// A failed computation is reported to every caller waiting on the key
    /// and is not cached; the next lookup computes again.
    pub async fn get_or_compute<F, Fut, E>(&self, key: FrameKey, compute: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DetectionBatch, E>>,
        E: Display,
    {
        let role = {
            let mut inner = self.lock();
            if let Some(batch) = inner.touch(&key) {
                metrics::record_cache_lookup("hit");
                return Ok(batch);
            }
            match inner.pending.get(&key) {
                Some(rx) => {
                    metrics::record_cache_lookup("coalesced");
                    Role::Waiter(rx.clone())
                }
                None => {
                    metrics::record_cache_lookup("miss");
                    let (tx, rx) = watch::channel(None);
                    inner.pending.insert(key, rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Waiter(rx) => Self::wait(rx).await,
            Role::Leader(tx) => {
                let mut flight = Flight {
                    cache: self,
                    key,
                    tx: Some(tx),
                };
                let outcome = compute()
                    .await
                    .map(Arc::new)
                    .map_err(|e| CacheComputeError(e.to_string()));
                flight.complete(outcome.clone());
                outcome
            }
        }
    }

    async fn wait(mut rx: watch::Receiver<Option<Outcome>>) -> Outcome {
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return rx
                    .borrow()
                    .clone()
                    .unwrap_or_else(|| Err(CacheComputeError::abandoned()));
            }
        }
    }

    /// Look up without computing; refreshes recency on a hit.
    pub fn get(&self, key: &FrameKey) -> Option<Arc<DetectionBatch>> {
        self.lock().touch(key)
    }

    pub fn contains(&self, key: &FrameKey) -> bool {
        self.lock().ready.contains_key(key)
    }

    /// Completed entries.
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Computations currently in flight.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.ready.clear();
        metrics::record_cache_size(0);
    }

    /// False once a thread panicked while holding the cache lock.
    pub fn is_healthy(&self) -> bool {
        !self.inner.is_poisoned()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Owns the pending marker for one key until the leader completes.
struct Flight<'a> {
    cache: &'a ResultCache,
    key: FrameKey,
    tx: Option<watch::Sender<Option<Outcome>>>,
}

impl Flight<'_> {
    fn complete(&mut self, outcome: Outcome) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let mut inner = self.cache.lock();
        inner.pending.remove(&self.key);
        if let Ok(batch) = &outcome {
            inner.insert(self.key, Arc::clone(batch), self.cache.capacity);
        }
        metrics::record_cache_size(inner.ready.len());
        drop(inner);
        tx.send_replace(Some(outcome));
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!(key = %self.key, "Cache computation abandoned");
            self.complete(Err(CacheComputeError::abandoned()));
        }
    }
}
