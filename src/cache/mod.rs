//! Request deduplication and response caching.
//!
//! [`RequestCache`] combines two maps keyed by [`RequestKey`]:
//!
//! - an in-flight map, so concurrent identical requests share one network call
//! - a TTL cache of successful responses, expired lazily on read
//!
//! Each new request runs on its own tokio task. A caller that stops waiting
//! does not cancel the request for the other sharers, and the in-flight entry
//! is always removed by a drop guard when the task ends, including on panic.

mod entry;

pub use entry::CacheEntry;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;

use crate::error::RequestError;
use crate::request::RequestKey;
use entry::{lock, CacheState, InFlightEntry, InFlightGuard};

/// How one request interacts with the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Serve a fresh cached value without a network call
    pub read: bool,
    /// Store a successful result for this long
    pub ttl: Option<Duration>,
}

impl CachePolicy {
    /// Neither read nor write the cache. Deduplication still applies.
    pub fn bypass() -> Self {
        Self::default()
    }

    /// Read the cache and store successes for `ttl` when given.
    pub fn cached(ttl: Option<Duration>) -> Self {
        Self {
            read: true,
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
        }
    }
}

/// Shared in-flight map plus TTL cache.
///
/// Cloning is cheap and clones share state.
pub struct RequestCache<T> {
    state: Arc<Mutex<CacheState<T>>>,
}

impl<T> Clone for RequestCache<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for RequestCache<T> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }
}

impl<T> std::fmt::Debug for RequestCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("RequestCache")
            .field("cached", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

impl<T> RequestCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a cached value, join an in-flight request, or start `fetch`.
    ///
    /// Must be called from within a tokio runtime. On completion the cache is
    /// written first (success with a TTL), then the in-flight entry is
    /// removed, then all sharers are resolved with the same result.
    pub async fn get_or_fetch<F>(
        &self,
        key: RequestKey,
        policy: CachePolicy,
        fetch: F,
    ) -> Result<T, RequestError>
    where
        F: Future<Output = Result<T, RequestError>> + Send + 'static,
    {
        let shared = {
            let mut state = lock(&self.state);

            if policy.read {
                if let Some(data) = Self::fresh_entry(&mut state, &key) {
                    tracing::debug!(key = %key, "Cache hit");
                    return Ok(data);
                }
            }

            if let Some(entry) = state.in_flight.get(&key) {
                tracing::debug!(key = %key, "Joining in-flight request");
                entry.future.clone()
            } else {
                state.next_generation += 1;
                let generation = state.next_generation;
                let epoch = state.epoch;
                let guard = InFlightGuard::new(&self.state, key.clone(), generation);
                let cache_state = Arc::clone(&self.state);
                let cache_key = key.clone();
                let ttl = policy.ttl;

                // The lock is held until the entry is inserted; the task's cache
                // write and guard both wait for it.
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    let result = fetch.await;
                    if let (Ok(data), Some(ttl)) = (&result, ttl) {
                        let mut state = lock(&cache_state);
                        if state.epoch == epoch {
                            state.entries.insert(
                                cache_key,
                                CacheEntry {
                                    data: data.clone(),
                                    expires_at: Instant::now() + ttl,
                                },
                            );
                        }
                    }
                    result
                });

                let future = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(join_error) => Err(RequestError::Internal {
                            message: join_error.to_string(),
                        }),
                    }
                }
                .boxed()
                .shared();

                state.in_flight.insert(
                    key,
                    InFlightEntry {
                        generation,
                        future: future.clone(),
                    },
                );
                future
            }
        };

        shared.await
    }

    /// Fresh cached value for `key`, if any. Expired entries are removed.
    pub fn cached(&self, key: &RequestKey) -> Option<T> {
        let mut state = lock(&self.state);
        Self::fresh_entry(&mut state, key)
    }

    fn fresh_entry(state: &mut CacheState<T>, key: &RequestKey) -> Option<T> {
        let fresh = state.entries.get(key)?.is_fresh(Instant::now());
        if fresh {
            state.entries.get(key).map(|entry| entry.data.clone())
        } else {
            state.entries.remove(key);
            None
        }
    }

    /// Drop every cached value and forget in-flight requests.
    ///
    /// Requests already running still resolve their callers but no longer
    /// populate the cache.
    pub fn clear_all(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.in_flight.clear();
        state.epoch += 1;
    }

    /// Drop the cached value for one key. Returns whether one was present.
    pub fn invalidate(&self, key: &RequestKey) -> bool {
        lock(&self.state).entries.remove(key).is_some()
    }

    /// Number of cache entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).entries.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.state).in_flight.len()
    }
}
