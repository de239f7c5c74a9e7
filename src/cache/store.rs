//! Tag-aware response cache with single-flight computation.
//!
//! Entries are opaque serialized payloads. Each entry carries one or more
//! tags; invalidating a tag evicts every entry carrying it and advances the
//! tag's epoch so that computations already underway cannot publish stale
//! results afterwards.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use metrics::{counter, gauge};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::keys::{CacheKey, CacheTag};
use super::registry::{EpochSnapshot, TagRegistry};

const METRIC_CACHE_HIT: &str = "bookshelf_cache_hit_total";
const METRIC_CACHE_MISS: &str = "bookshelf_cache_miss_total";
const METRIC_CACHE_PRODUCER_FAILURE: &str = "bookshelf_cache_producer_failure_total";
const METRIC_CACHE_STALE_DISCARD: &str = "bookshelf_cache_stale_discard_total";
const METRIC_CACHE_INVALIDATED: &str = "bookshelf_cache_invalidated_total";
const METRIC_CACHE_ENTRIES: &str = "bookshelf_cache_entries";

type SharedError = Arc<dyn StdError + Send + Sync + 'static>;
type FlightFuture = BoxFuture<'static, Result<Bytes, CacheError>>;

/// Failure surfaced by [`TagCache::get_or_compute`].
///
/// Cloneable so that every caller waiting on one flight observes the same error.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache producer failed")]
    Producer(#[source] SharedError),
    #[error("cache producer timed out after {0:?}")]
    Timeout(Duration),
}

impl CacheError {
    /// The producer's own error, when the failure came from the producer.
    pub fn producer_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Producer(source) => Some(source.as_ref()),
            Self::Timeout(_) => None,
        }
    }
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub in_flight: usize,
    pub tags: Vec<TagStats>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TagStats {
    pub tag: &'static str,
    pub keys: usize,
    pub epoch: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Bytes>,
    registry: TagRegistry,
}

struct Flight {
    id: u64,
    epochs: EpochSnapshot,
    result: Option<WeakShared<FlightFuture>>,
}

struct Inner {
    config: CacheConfig,
    state: RwLock<CacheState>,
    in_flight: DashMap<CacheKey, Flight>,
    next_flight_id: AtomicU64,
}

/// Shared handle to the response cache.
///
/// Cloning is cheap; all clones observe the same entries.
#[derive(Clone)]
pub struct TagCache {
    inner: Arc<Inner>,
}

impl Default for TagCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for TagCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagCache")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl TagCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: RwLock::new(CacheState::default()),
                in_flight: DashMap::new(),
                next_flight_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Return the cached payload for `key`, or compute it with `producer`.
    ///
    /// Concurrent misses for the same key share a single producer run. The
    /// computed payload is stored under `tags` unless one of those tags was
    /// invalidated while the producer was running. Producer failures are
    /// returned to every waiter and nothing is stored.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: CacheKey,
        tags: &[CacheTag],
        producer: F,
    ) -> Result<Bytes, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Bytes, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        if !self.inner.config.enabled {
            return run_producer(producer, self.inner.config.producer_timeout).await;
        }

        if let Some(payload) = self.inner.lookup(&key) {
            counter!(METRIC_CACHE_HIT).increment(1);
            debug!(key = %key, "cache hit");
            return Ok(payload);
        }

        match self.join_or_start(key, tags, producer) {
            Lookup::Hit(payload) => Ok(payload),
            Lookup::Flight(flight) => flight.await,
        }
    }

    fn join_or_start<F, Fut, E>(&self, key: CacheKey, tags: &[CacheTag], producer: F) -> Lookup
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Bytes, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                // Only upgrade once the flight is known to be current: the
                // strong handle must not be dropped while the shard is held.
                if self.inner.is_current(&occupied.get().epochs) {
                    let joined = occupied
                        .get()
                        .result
                        .as_ref()
                        .and_then(WeakShared::upgrade);
                    if let Some(shared) = joined {
                        debug!(key = %key, "joined in-flight computation");
                        return Lookup::Flight(shared);
                    }
                }

                debug!(key = %key, "replacing stale in-flight computation");
                let (flight, shared) = self.new_flight(key, tags, producer);
                occupied.insert(flight);
                Lookup::Flight(shared)
            }
            Entry::Vacant(vacant) => {
                // A flight may have published between the fast-path lookup
                // and acquiring the slot.
                if let Some(payload) = self.inner.lookup(&key) {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    return Lookup::Hit(payload);
                }

                let (flight, shared) = self.new_flight(key, tags, producer);
                vacant.insert(flight);
                Lookup::Flight(shared)
            }
        }
    }

    fn new_flight<F, Fut, E>(
        &self,
        key: CacheKey,
        tags: &[CacheTag],
        producer: F,
    ) -> (Flight, Shared<FlightFuture>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Bytes, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        counter!(METRIC_CACHE_MISS).increment(1);
        debug!(key = %key, "cache miss");

        let id = self.inner.next_flight_id.fetch_add(1, Ordering::Relaxed);
        let epochs = self.inner.snapshot(tags);
        let slot = FlightSlot {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            id,
        };
        let inner = Arc::clone(&self.inner);
        let tags = tags.to_vec();
        let published_epochs = epochs.clone();

        let future: FlightFuture = async move {
            let _slot = slot;
            let outcome = run_producer(producer, inner.config.producer_timeout).await;
            if let Ok(payload) = &outcome {
                inner.publish(key, &tags, &published_epochs, payload.clone());
            }
            outcome
        }
        .boxed();
        let shared = future.shared();

        let flight = Flight {
            id,
            epochs,
            result: shared.downgrade(),
        };
        (flight, shared)
    }

    /// Evict every entry carrying `tag` and return how many were removed.
    ///
    /// Computations that started before this call will not publish.
    pub fn invalidate_tag(&self, tag: CacheTag) -> usize {
        let removed = {
            let mut guard = self.inner.write("invalidate_tag");
            let state = &mut *guard;
            let keys = state.registry.take_tag(tag);
            let removed = keys
                .iter()
                .filter(|key| state.entries.remove(*key).is_some())
                .count();
            gauge!(METRIC_CACHE_ENTRIES).set(state.entries.len() as f64);
            removed
        };

        counter!(METRIC_CACHE_INVALIDATED, "tag" => tag.as_str()).increment(removed as u64);
        info!(tag = tag.as_str(), removed, "cache tag invalidated");
        removed
    }

    /// Evict every entry and advance every tag epoch.
    pub fn invalidate_all(&self) -> usize {
        let removed = {
            let mut guard = self.inner.write("invalidate_all");
            let state = &mut *guard;
            for tag in CacheTag::ALL {
                state.registry.take_tag(tag);
            }
            let removed = state.entries.len();
            state.entries.clear();
            gauge!(METRIC_CACHE_ENTRIES).set(0.0);
            removed
        };

        counter!(METRIC_CACHE_INVALIDATED, "tag" => "*").increment(removed as u64);
        info!(removed, "cache cleared");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let in_flight = self.inner.in_flight.len();
        let state = self.inner.read("stats");
        CacheStats {
            enabled: self.inner.config.enabled,
            entries: state.entries.len(),
            in_flight,
            tags: CacheTag::ALL
                .into_iter()
                .map(|tag| TagStats {
                    tag: tag.as_str(),
                    keys: state.registry.tag_len(tag),
                    epoch: state.registry.epoch(tag),
                })
                .collect(),
        }
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.inner.read("contains_key").entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read("len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Lookup {
    Hit(Bytes),
    Flight(Shared<FlightFuture>),
}

impl Inner {
    fn read(&self, op: &'static str) -> RwLockReadGuard<'_, CacheState> {
        recover(self.state.read(), op)
    }

    fn write(&self, op: &'static str) -> RwLockWriteGuard<'_, CacheState> {
        recover(self.state.write(), op)
    }

    fn lookup(&self, key: &CacheKey) -> Option<Bytes> {
        self.read("lookup").entries.get(key).cloned()
    }

    fn snapshot(&self, tags: &[CacheTag]) -> EpochSnapshot {
        self.read("snapshot").registry.snapshot(tags)
    }

    fn is_current(&self, epochs: &[(CacheTag, u64)]) -> bool {
        self.read("is_current").registry.is_current(epochs)
    }

    fn publish(
        &self,
        key: CacheKey,
        tags: &[CacheTag],
        epochs: &[(CacheTag, u64)],
        payload: Bytes,
    ) {
        let mut state = self.write("publish");
        if !state.registry.is_current(epochs) {
            drop(state);
            counter!(METRIC_CACHE_STALE_DISCARD).increment(1);
            debug!(key = %key, "discarded payload computed before invalidation");
            return;
        }

        state.registry.register(key.clone(), tags);
        state.entries.insert(key, payload);
        gauge!(METRIC_CACHE_ENTRIES).set(state.entries.len() as f64);
    }
}

/// Take the guard even if another thread panicked while holding the lock.
fn recover<G>(result: LockResult<G>, op: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(op, "recovered poisoned cache state lock");
        poisoned.into_inner()
    })
}

/// Releases the in-flight slot when the flight finishes or is dropped.
struct FlightSlot {
    inner: Arc<Inner>,
    key: CacheKey,
    id: u64,
}

impl Drop for FlightSlot {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .remove_if(&self.key, |_, flight| flight.id == self.id);
    }
}

async fn run_producer<F, Fut, E>(producer: F, timeout: Duration) -> Result<Bytes, CacheError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Bytes, E>>,
    E: StdError + Send + Sync + 'static,
{
    let outcome = match tokio::time::timeout(timeout, producer()).await {
        Ok(Ok(payload)) => return Ok(payload),
        Ok(Err(err)) => CacheError::Producer(Arc::new(err)),
        Err(_) => CacheError::Timeout(timeout),
    };

    counter!(METRIC_CACHE_PRODUCER_FAILURE).increment(1);
    warn!(error = %outcome, source = ?outcome.producer_error(), "cache producer failed");
    Err(outcome)
}
