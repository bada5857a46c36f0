// SPDX-License-Identifier: MIT

//! Deduplicating cache for remote binary resources (profile and event
//! images).
//!
//! Concurrent `get` calls for the same locator collapse into a single
//! fetch: the first caller spawns the transfer and later callers join its
//! outcome over a broadcast channel. The transfer runs as a detached task,
//! so a caller abandoning interest never cancels it for the others and the
//! cache is populated regardless.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Underlying transport the cache fetches through.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>>;
}

/// HTTP transport for locators that are plain URLs.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchTransport for HttpTransport {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(locator)
            .send()
            .await
            .map_err(|e| AppError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "HTTP {} fetching {}",
                response.status(),
                locator
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| AppError::Fetch(e.to_string()))
    }
}

/// Shared fetch outcome. Errors are broadcast to every joined caller but
/// never cached, so each caller may retry independently.
type Outcome = std::result::Result<Arc<Vec<u8>>, Arc<AppError>>;

/// Rebuild a caller-owned error from the shared failure. `AppError` is not
/// `Clone`; the message is carried over without repeating the variant's
/// display prefix.
fn share_fetch_error(e: &AppError) -> AppError {
    match e {
        AppError::Fetch(msg) => AppError::Fetch(msg.clone()),
        other => AppError::Fetch(other.to_string()),
    }
}

struct CacheEntry {
    payload: Arc<Vec<u8>>,
    /// Logical access time for LRU eviction.
    last_used: AtomicU64,
}

struct CacheInner {
    transport: Arc<dyn FetchTransport>,
    entries: DashMap<String, CacheEntry>,
    inflight: DashMap<String, broadcast::Sender<Outcome>>,
    clock: AtomicU64,
    total_bytes: AtomicUsize,
    /// Byte budget; `None` means entries live for the process lifetime.
    max_bytes: Option<usize>,
}

/// Concurrency-safe locator → payload cache with in-flight deduplication.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

impl ResourceCache {
    /// Unbounded cache (the base design).
    pub fn new(transport: Arc<dyn FetchTransport>) -> Self {
        Self::with_max_bytes(transport, None)
    }

    /// Cache bounded to roughly `max_bytes` of payload, evicting the least
    /// recently used entries. The join-in-flight contract is unchanged.
    pub fn with_max_bytes(transport: Arc<dyn FetchTransport>, max_bytes: Option<usize>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                transport,
                entries: DashMap::new(),
                inflight: DashMap::new(),
                clock: AtomicU64::new(0),
                total_bytes: AtomicUsize::new(0),
                max_bytes,
            }),
        }
    }

    /// Fetch the resource at `locator`, serving repeats from memory and
    /// joining an already in-flight fetch for the same locator.
    pub async fn get(&self, locator: &str) -> Result<Arc<Vec<u8>>> {
        loop {
            if let Some(entry) = self.inner.entries.get(locator) {
                entry
                    .last_used
                    .store(self.inner.tick(), Ordering::Relaxed);
                return Ok(entry.payload.clone());
            }

            let mut rx = match self.inner.inflight.entry(locator.to_string()) {
                Entry::Occupied(occupied) => occupied.get().subscribe(),
                Entry::Vacant(vacant) => {
                    let (tx, rx) = broadcast::channel(1);
                    vacant.insert(tx.clone());
                    self.spawn_fetch(locator.to_string(), tx);
                    rx
                }
            };

            match rx.recv().await {
                Ok(Ok(payload)) => return Ok(payload),
                Ok(Err(e)) => return Err(share_fetch_error(e.as_ref())),
                // Sender finished before we subscribed; re-check the cache.
                Err(_) => continue,
            }
        }
    }

    /// Number of completed entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Whether a completed entry exists for `locator`.
    pub fn contains(&self, locator: &str) -> bool {
        self.inner.entries.contains_key(locator)
    }

    /// Spawn the single transfer for `locator` as a detached task: it
    /// completes and populates the cache even when every caller has gone.
    fn spawn_fetch(&self, locator: String, tx: broadcast::Sender<Outcome>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome: Outcome = match inner.transport.fetch(&locator).await {
                Ok(bytes) => {
                    let payload = Arc::new(bytes);
                    inner.store(&locator, payload.clone());
                    Ok(payload)
                }
                Err(e) => {
                    tracing::warn!(locator = %locator, error = %e, "Resource fetch failed");
                    Err(Arc::new(e))
                }
            };
            inner.inflight.remove(&locator);
            // No receivers left is fine; the entry is already stored.
            let _ = tx.send(outcome);
        });
    }
}

impl CacheInner {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn store(&self, locator: &str, payload: Arc<Vec<u8>>) {
        let size = payload.len();
        let previous = self.entries.insert(
            locator.to_string(),
            CacheEntry {
                payload,
                last_used: AtomicU64::new(self.tick()),
            },
        );
        if let Some(previous) = previous {
            self.total_bytes
                .fetch_sub(previous.payload.len(), Ordering::Relaxed);
        }
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        self.evict_over_budget(locator);
    }

    /// Evict least-recently-used entries until the byte budget holds. The
    /// just-inserted locator is spared: a single oversized payload stays
    /// cached rather than being refetched forever.
    fn evict_over_budget(&self, just_inserted: &str) {
        let Some(max_bytes) = self.max_bytes else {
            return;
        };
        while self.total_bytes.load(Ordering::Relaxed) > max_bytes {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != just_inserted)
                .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());
            let Some(key) = oldest else {
                break;
            };
            if let Some((_, evicted)) = self.entries.remove(&key) {
                self.total_bytes
                    .fetch_sub(evicted.payload.len(), Ordering::Relaxed);
                tracing::debug!(locator = %key, "Evicted cache entry over byte budget");
            }
        }
    }
}
