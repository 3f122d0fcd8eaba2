//! Live dashboard channel.
//!
//! [`LiveChannel`] keeps the latest snapshot of a polled resource in a
//! `watch` channel, together with the loading flag, the last fetch error and
//! the fields that changed in the last update. Changed fields are cleared
//! again after a short highlight period.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::diff::DiffMode;
use super::scheduler::SubscriptionScheduler;
use super::subscription::{SubscribeOptions, SubscriptionId, SubscriptionState};
use crate::error::{RequestError, SchedulerError};

/// Default highlight period for changed fields.
pub const DEFAULT_HIGHLIGHT: Duration = Duration::from_secs(2);

/// Snapshot published to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveState {
    pub data: Option<Value>,
    /// True until the first successful fetch or the first error
    pub loading: bool,
    /// Last fetch error, cleared by the next delivered update
    pub error: Option<RequestError>,
    pub changed_fields: Vec<String>,
}

impl Default for LiveState {
    fn default() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
            changed_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveOptions {
    pub channel: String,
    /// Poll interval; the scheduler default when `None`
    pub interval: Option<Duration>,
    /// Clear `changed_fields` after `highlight_duration`
    pub highlight_changes: bool,
    pub highlight_duration: Duration,
    pub diff_mode: DiffMode,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            channel: "stats".to_string(),
            interval: None,
            highlight_changes: true,
            highlight_duration: DEFAULT_HIGHLIGHT,
            diff_mode: DiffMode::Shallow,
        }
    }
}

impl LiveOptions {
    pub fn channel(name: impl Into<String>) -> Self {
        Self {
            channel: name.into(),
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_highlight(mut self, enabled: bool, duration: Duration) -> Self {
        self.highlight_changes = enabled;
        self.highlight_duration = duration;
        self
    }

    pub fn with_diff_mode(mut self, diff_mode: DiffMode) -> Self {
        self.diff_mode = diff_mode;
        self
    }
}

/// A subscription whose state is observable through a `watch` receiver.
///
/// Dropping the channel unsubscribes it.
#[derive(Debug)]
pub struct LiveChannel {
    scheduler: SubscriptionScheduler,
    id: SubscriptionId,
    channel: String,
    state: watch::Receiver<LiveState>,
}

impl LiveChannel {
    pub fn open<F, Fut>(
        scheduler: &SubscriptionScheduler,
        options: LiveOptions,
        fetch: F,
    ) -> Result<Self, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RequestError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(LiveState::default());
        let tx = Arc::new(tx);

        let error_tx = Arc::clone(&tx);
        let capturing_fetch = move || {
            let pending = fetch();
            let tx = Arc::clone(&error_tx);
            async move {
                let result = pending.await;
                if let Err(ref error) = result {
                    tx.send_modify(|state| {
                        state.error = Some(error.clone());
                        state.loading = false;
                    });
                }
                result
            }
        };

        let highlight = options
            .highlight_changes
            .then_some(options.highlight_duration);
        let generation = Arc::new(AtomicU64::new(0));
        let update_tx = Arc::clone(&tx);
        let on_update = move |data: &Value, changed: &[String]| {
            update_tx.send_modify(|state| {
                state.data = Some(data.clone());
                state.loading = false;
                state.error = None;
                if !changed.is_empty() {
                    state.changed_fields = changed.to_vec();
                }
            });
            if let Some(duration) = highlight.filter(|_| !changed.is_empty()) {
                let current = generation.fetch_add(1, Ordering::SeqCst) + 1;
                schedule_highlight_clear(Arc::clone(&update_tx), Arc::clone(&generation), current, duration);
            }
        };

        let subscribe_options = SubscribeOptions {
            interval: options.interval,
            diff_mode: options.diff_mode,
        };
        let id = scheduler.subscribe_with(
            &options.channel,
            subscribe_options,
            capturing_fetch,
            on_update,
        )?;

        Ok(Self {
            scheduler: scheduler.clone(),
            id,
            channel: options.channel,
            state: rx,
        })
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Current state.
    pub fn state(&self) -> LiveState {
        self.state.borrow().clone()
    }

    /// A receiver for observing state changes.
    pub fn watch(&self) -> watch::Receiver<LiveState> {
        self.state.clone()
    }

    /// Whether polling stopped after repeated failures.
    pub fn is_paused(&self) -> bool {
        self.scheduler.subscription_state(self.id) == SubscriptionState::CircuitOpen
    }

    /// Fetch this channel now.
    pub async fn refresh(&self) {
        self.scheduler.refresh(&self.channel).await;
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.scheduler.unsubscribe(self.id);
    }
}

fn schedule_highlight_clear(
    tx: Arc<watch::Sender<LiveState>>,
    generation: Arc<AtomicU64>,
    current: u64,
    duration: Duration,
) {
    let Ok(runtime) = Handle::try_current() else {
        return;
    };
    runtime.spawn(async move {
        tokio::time::sleep(duration).await;
        // A newer change owns the highlight now.
        if generation.load(Ordering::SeqCst) == current {
            tx.send_modify(|state| state.changed_fields.clear());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn scheduler() -> SubscriptionScheduler {
        SubscriptionScheduler::new(SyncConfig::default().with_activity_log(false))
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn() -> futures::future::Ready<Result<Value, RequestError>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(json!({ "volunteers": n })))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_then_data() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let live = LiveChannel::open(
            &scheduler,
            LiveOptions::channel("stats").with_interval(Duration::from_secs(15)),
            counting_fetch(&calls),
        )
        .unwrap();

        assert!(live.state().loading);

        let mut rx = live.watch();
        rx.changed().await.unwrap();
        let state = live.state();
        assert!(!state.loading);
        assert_eq!(state.data, Some(json!({"volunteers": 0})));
        assert!(state.changed_fields.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_fields_are_highlighted_then_cleared() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let live = LiveChannel::open(
            &scheduler,
            LiveOptions::channel("stats").with_interval(Duration::from_secs(15)),
            counting_fetch(&calls),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        live.refresh().await;
        assert_eq!(live.state().changed_fields, vec!["volunteers"]);

        tokio::time::sleep(DEFAULT_HIGHLIGHT + Duration::from_millis(1)).await;
        assert!(live.state().changed_fields.is_empty());
        assert_eq!(live.state().data, Some(json!({"volunteers": 1})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_captured_and_cleared_by_next_update() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let live = LiveChannel::open(
            &scheduler,
            LiveOptions::channel("stats").with_interval(Duration::from_secs(15)),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(RequestError::AuthRequired)
                    } else {
                        Ok(json!({"ok": true}))
                    }
                }
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        let state = live.state();
        assert_eq!(state.error, Some(RequestError::AuthRequired));
        assert!(!state.loading);

        live.refresh().await;
        let state = live.state();
        assert_eq!(state.error, None);
        assert_eq!(state.data, Some(json!({"ok": true})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_unsubscribes() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let live = LiveChannel::open(&scheduler, LiveOptions::default(), counting_fetch(&calls)).unwrap();
        let id = live.id();
        assert_eq!(scheduler.subscription_state(id), SubscriptionState::Active);

        drop(live);
        assert_eq!(scheduler.subscription_state(id), SubscriptionState::Removed);
        assert_eq!(scheduler.active_subscription_count(), 0);
    }
}
