//! Cache and in-flight entry types.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;

use crate::error::RequestError;
use crate::request::RequestKey;

/// Future shared by every caller of one in-flight request.
pub(crate) type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, RequestError>>>;

/// A cached successful response.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Valid iff `now < expires_at`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A request currently on the wire.
pub(crate) struct InFlightEntry<T> {
    pub(crate) generation: u64,
    pub(crate) future: SharedFetch<T>,
}

pub(crate) struct CacheState<T> {
    pub(crate) entries: HashMap<RequestKey, CacheEntry<T>>,
    pub(crate) in_flight: HashMap<RequestKey, InFlightEntry<T>>,
    pub(crate) next_generation: u64,
    /// Bumped by `clear_all`; completions from an older epoch skip the cache write.
    pub(crate) epoch: u64,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            next_generation: 0,
            epoch: 0,
        }
    }
}

pub(crate) fn lock<T>(state: &Mutex<CacheState<T>>) -> std::sync::MutexGuard<'_, CacheState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes an in-flight entry when the request task ends, however it ends.
///
/// Only the entry with a matching generation is removed, so a guard never
/// evicts a newer request for the same key.
pub(crate) struct InFlightGuard<T> {
    pub(crate) state: Weak<Mutex<CacheState<T>>>,
    pub(crate) key: RequestKey,
    pub(crate) generation: u64,
}

impl<T> InFlightGuard<T> {
    pub(crate) fn new(state: &Arc<Mutex<CacheState<T>>>, key: RequestKey, generation: u64) -> Self {
        Self {
            state: Arc::downgrade(state),
            key,
            generation,
        }
    }
}

impl<T> Drop for InFlightGuard<T> {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = lock(&state);
        let matches = state
            .in_flight
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation);
        if matches {
            state.in_flight.remove(&self.key);
        }
    }
}
