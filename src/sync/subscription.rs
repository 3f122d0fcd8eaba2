//! Subscription records and their per-tick state machine.

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::diff::{ChangeDetector, DiffMode};
use crate::error::RequestError;

/// Unique subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a subscription as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Polling on its timer
    Active,
    /// Stopped after too many consecutive failures
    CircuitOpen,
    /// Unsubscribed, disconnected, or never known
    Removed,
}

/// Whether the scheduler is serving subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// One delivered update.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelUpdate {
    pub data: Value,
    /// Empty on the first delivery
    pub changed_fields: Vec<String>,
}

/// Per-subscription options beyond the channel name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Poll interval; the scheduler default when `None`
    pub interval: Option<Duration>,
    pub diff_mode: DiffMode,
}

impl SubscribeOptions {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
            ..Self::default()
        }
    }

    pub fn with_diff_mode(mut self, diff_mode: DiffMode) -> Self {
        self.diff_mode = diff_mode;
        self
    }
}

pub(crate) type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, RequestError>> + Send + Sync>;
pub(crate) type UpdateFn = Arc<dyn Fn(&Value, &[String]) + Send + Sync>;

pub(crate) fn boxed_fetch<F, Fut>(fetch: F) -> FetchFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RequestError>> + Send + 'static,
{
    Arc::new(move || fetch().boxed())
}

#[derive(Debug, Default)]
struct PollState {
    last_data: Option<Value>,
    active: bool,
    removed: bool,
    retry_count: u32,
    /// Last tick handed out
    started_tick: u64,
    /// Last tick whose result was applied
    applied_tick: u64,
}

/// What happened to one completed fetch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TickOutcome {
    /// First data or changed data; the update callback ran
    Delivered(Vec<String>),
    /// Same data as before
    Unchanged,
    /// Fetch failed; the subscription is still active
    Failed { retry_count: u32 },
    /// Fetch failed and the circuit is now open
    CircuitOpened,
    /// Older than an applied tick, or the subscription is gone
    Discarded,
}

pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) channel: String,
    pub(crate) interval: Duration,
    fetch: FetchFn,
    update: UpdateFn,
    detector: ChangeDetector,
    max_failures: u32,
    state: Mutex<PollState>,
    /// Serializes result delivery so updates reach the callback in tick order
    delivery: Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    pub(crate) fn new(
        channel: &str,
        interval: Duration,
        diff_mode: DiffMode,
        max_failures: u32,
        fetch: FetchFn,
        update: UpdateFn,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            channel: channel.to_string(),
            interval,
            fetch,
            update,
            detector: ChangeDetector::new(diff_mode),
            max_failures: max_failures.max(1),
            state: Mutex::new(PollState {
                active: true,
                ..PollState::default()
            }),
            delivery: Mutex::new(()),
            timer: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.removed {
            SubscriptionState::Removed
        } else if state.active {
            SubscriptionState::Active
        } else {
            SubscriptionState::CircuitOpen
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    pub(crate) fn set_timer(&self, handle: JoinHandle<()>) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
    }

    /// Mark removed and stop the timer. Later completions become no-ops.
    pub(crate) fn cancel(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.removed = true;
            state.active = false;
        }
        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    /// Run one fetch and apply its result. `None` if the subscription is not
    /// active.
    pub(crate) async fn tick(&self) -> Option<TickOutcome> {
        let tick = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.active || state.removed {
                return None;
            }
            state.started_tick += 1;
            state.started_tick
        };

        let result = (self.fetch)().await;
        Some(self.apply(tick, result))
    }

    pub(crate) fn apply(&self, tick: u64, result: Result<Value, RequestError>) -> TickOutcome {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        let delivered = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.removed || !state.active || tick <= state.applied_tick {
                return TickOutcome::Discarded;
            }
            state.applied_tick = tick;

            match result {
                Ok(data) => {
                    state.retry_count = 0;
                    let changed = match state.last_data {
                        None => Some(Vec::new()),
                        Some(ref previous) => {
                            let changed = self.detector.diff(previous, &data);
                            (!changed.is_empty()).then_some(changed)
                        }
                    };
                    match changed {
                        Some(changed) => {
                            state.last_data = Some(data.clone());
                            (data, changed)
                        }
                        None => return TickOutcome::Unchanged,
                    }
                }
                Err(error) => {
                    state.retry_count += 1;
                    tracing::warn!(
                        channel = %self.channel,
                        subscription = %self.id,
                        retry_count = state.retry_count,
                        error = %error,
                        "Subscription fetch failed"
                    );
                    if state.retry_count >= self.max_failures {
                        state.active = false;
                        return TickOutcome::CircuitOpened;
                    }
                    return TickOutcome::Failed {
                        retry_count: state.retry_count,
                    };
                }
            }
        };

        let (data, changed) = delivered;
        // The timer task must outlive a misbehaving callback.
        if panic::catch_unwind(AssertUnwindSafe(|| (self.update)(&data, &changed))).is_err() {
            tracing::error!(
                channel = %self.channel,
                subscription = %self.id,
                "Update callback panicked"
            );
        }
        TickOutcome::Delivered(changed)
    }

    #[cfg(test)]
    pub(crate) fn retry_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retry_count
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
