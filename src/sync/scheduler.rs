//! Channel-based polling scheduler.
//!
//! Each subscription owns one tokio timer task. The first tick fires
//! immediately, later ticks follow the subscription's interval. A tick's fetch
//! is awaited before the next tick is scheduled, so one timer never overlaps
//! itself; out-of-band [`refresh`](SubscriptionScheduler::refresh) calls may
//! overlap a tick and the stale completion is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::subscription::{
    boxed_fetch, ChannelUpdate, ConnectionState, SubscribeOptions, Subscription, SubscriptionId,
    SubscriptionState, TickOutcome,
};
use crate::config::SyncConfig;
use crate::error::{RequestError, SchedulerError};

/// Shortest accepted poll interval.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Polls named channels and delivers changed snapshots.
///
/// Cloning is cheap; clones share subscriptions.
///
/// # Example
///
/// ```ignore
/// let scheduler = SubscriptionScheduler::new(SyncConfig::default());
/// let id = scheduler.subscribe(
///     "stats",
///     move || { let exec = exec.clone(); async move { exec.execute("/stats", RequestOptions::get()).await } },
///     |data, changed| println!("{changed:?}: {data}"),
///     Some(Duration::from_secs(15)),
/// )?;
/// ```
#[derive(Clone)]
pub struct SubscriptionScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: SyncConfig,
    channels: Mutex<HashMap<String, Vec<Arc<Subscription>>>>,
    connection: watch::Sender<ConnectionState>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for SubscriptionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionScheduler")
            .field("connection", &self.connection_state())
            .field("active_subscriptions", &self.active_subscription_count())
            .finish()
    }
}

impl SubscriptionScheduler {
    pub fn new(config: SyncConfig) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                channels: Mutex::new(HashMap::new()),
                connection,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Subscribe `fetch` on `channel`; `update` receives first and changed data.
    ///
    /// `interval` falls back to the configured default poll interval.
    pub fn subscribe<F, Fut, U>(
        &self,
        channel: &str,
        fetch: F,
        update: U,
        interval: Option<Duration>,
    ) -> Result<SubscriptionId, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RequestError>> + Send + 'static,
        U: Fn(&Value, &[String]) + Send + Sync + 'static,
    {
        let options = SubscribeOptions {
            interval,
            ..SubscribeOptions::default()
        };
        self.subscribe_with(channel, options, fetch, update)
    }

    /// Subscribe with explicit options such as the diff mode.
    pub fn subscribe_with<F, Fut, U>(
        &self,
        channel: &str,
        options: SubscribeOptions,
        fetch: F,
        update: U,
    ) -> Result<SubscriptionId, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RequestError>> + Send + 'static,
        U: Fn(&Value, &[String]) + Send + Sync + 'static,
    {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(SchedulerError::Disposed);
        }
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let interval = options
            .interval
            .unwrap_or(self.inner.config.default_poll_interval)
            .max(MIN_INTERVAL);
        let subscription = Arc::new(Subscription::new(
            channel,
            interval,
            options.diff_mode,
            self.inner.config.max_consecutive_failures,
            boxed_fetch(fetch),
            Arc::new(update),
        ));
        let id = subscription.id;

        self.channels()
            .entry(channel.to_string())
            .or_default()
            .push(Arc::clone(&subscription));
        self.connect();

        let handle = runtime.spawn(poll_loop(
            Arc::downgrade(&subscription),
            interval,
            self.inner.config.activity_log,
        ));
        subscription.set_timer(handle);

        if self.inner.config.activity_log {
            info!(
                channel = %channel,
                subscription = %id,
                interval_ms = interval.as_millis() as u64,
                "Subscribed to channel"
            );
        }
        Ok(id)
    }

    /// Subscribe and receive updates as a stream.
    ///
    /// The stream ends when the subscription is removed.
    pub fn subscribe_stream<F, Fut>(
        &self,
        channel: &str,
        options: SubscribeOptions,
        fetch: F,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<ChannelUpdate>), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RequestError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe_with(channel, options, fetch, move |data, changed| {
            let update = ChannelUpdate {
                data: data.clone(),
                changed_fields: changed.to_vec(),
            };
            if tx.send(update).is_err() {
                debug!("Channel update receiver dropped");
            }
        })?;
        Ok((id, rx))
    }

    /// Remove a subscription and stop its timer. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut channels = self.channels();
            let mut found = None;
            for (channel, subs) in channels.iter_mut() {
                if let Some(index) = subs.iter().position(|s| s.id == id) {
                    found = Some((channel.clone(), subs.remove(index)));
                    break;
                }
            }
            if let Some((ref channel, _)) = found {
                if channels.get(channel).is_some_and(Vec::is_empty) {
                    channels.remove(channel);
                }
            }
            found
        };

        match removed {
            Some((channel, subscription)) => {
                subscription.cancel();
                if self.inner.config.activity_log {
                    info!(channel = %channel, subscription = %id, "Unsubscribed");
                }
                true
            }
            None => false,
        }
    }

    /// Remove every subscription on `channel`. Returns how many were removed.
    pub fn unsubscribe_channel(&self, channel: &str) -> usize {
        let removed = self.channels().remove(channel);
        let Some(subs) = removed else {
            return 0;
        };
        for subscription in &subs {
            subscription.cancel();
        }
        if self.inner.config.activity_log {
            info!(channel = %channel, count = subs.len(), "Unsubscribed all from channel");
        }
        subs.len()
    }

    /// Fetch every active subscription on `channel` now, independent of timers.
    pub async fn refresh(&self, channel: &str) {
        let subs = self.active_in(Some(channel));
        self.run_ticks(subs).await;
        if self.inner.config.activity_log {
            info!(channel = %channel, "Manually refreshed channel");
        }
    }

    /// Fetch every active subscription on every channel now.
    pub async fn refresh_all(&self) {
        let subs = self.active_in(None);
        self.run_ticks(subs).await;
        if self.inner.config.activity_log {
            info!("Manually refreshed all channels");
        }
    }

    /// Stop every timer and drop every subscription.
    pub fn disconnect(&self) {
        let drained: Vec<Arc<Subscription>> = {
            let mut channels = self.channels();
            channels.drain().flat_map(|(_, subs)| subs).collect()
        };
        for subscription in &drained {
            subscription.cancel();
        }
        self.inner
            .connection
            .send_replace(ConnectionState::Disconnected);
        if self.inner.config.activity_log {
            info!(removed = drained.len(), "Disconnected scheduler");
        }
    }

    /// Disconnect and refuse further subscriptions.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.disconnect();
    }

    /// Mark the scheduler as serving. Done implicitly by `subscribe`.
    pub fn connect(&self) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        let previous = self.inner.connection.send_replace(ConnectionState::Connected);
        if previous == ConnectionState::Disconnected && self.inner.config.activity_log {
            info!("Using polling for real-time updates");
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection.borrow()
    }

    /// Receiver notified on every connection state change.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    /// Subscriptions still polling (circuit-open ones are not counted).
    pub fn active_subscription_count(&self) -> usize {
        self.channels()
            .values()
            .flatten()
            .filter(|s| s.is_active())
            .count()
    }

    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }

    /// `Removed` for ids that are not (or no longer) registered.
    pub fn subscription_state(&self, id: SubscriptionId) -> SubscriptionState {
        self.channels()
            .values()
            .flatten()
            .find(|s| s.id == id)
            .map(|s| s.state())
            .unwrap_or(SubscriptionState::Removed)
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Vec<Arc<Subscription>>>> {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn active_in(&self, channel: Option<&str>) -> Vec<Arc<Subscription>> {
        let channels = self.channels();
        channels
            .iter()
            .filter(|(name, _)| channel.map_or(true, |wanted| wanted == name.as_str()))
            .flat_map(|(_, subs)| subs)
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }

    async fn run_ticks(&self, subs: Vec<Arc<Subscription>>) {
        let activity_log = self.inner.config.activity_log;
        let ticks = subs.iter().map(|subscription| async move {
            if let Some(outcome) = subscription.tick().await {
                log_outcome(subscription, &outcome, activity_log);
            }
        });
        futures::future::join_all(ticks).await;
    }
}

/// Timer task body. Holds only a weak reference so dropping the scheduler
/// ends the task.
async fn poll_loop(subscription: Weak<Subscription>, interval: Duration, activity_log: bool) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(subscription) = subscription.upgrade() else {
            break;
        };
        match subscription.tick().await {
            None => break,
            Some(outcome) => {
                log_outcome(&subscription, &outcome, activity_log);
                if outcome == TickOutcome::CircuitOpened {
                    break;
                }
            }
        }
    }
}

fn log_outcome(subscription: &Subscription, outcome: &TickOutcome, activity_log: bool) {
    match outcome {
        TickOutcome::Delivered(changed) if activity_log => {
            info!(
                channel = %subscription.channel,
                subscription = %subscription.id,
                changed = ?changed,
                "Updated channel"
            );
        }
        TickOutcome::CircuitOpened => {
            error!(
                channel = %subscription.channel,
                subscription = %subscription.id,
                "Too many errors, pausing updates"
            );
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn scheduler() -> SubscriptionScheduler {
        SubscriptionScheduler::new(SyncConfig::default().with_activity_log(false))
    }

    #[test]
    fn test_subscribe_without_runtime_fails() {
        let result = scheduler().subscribe("stats", || async { Ok(json!({})) }, |_, _| {}, None);
        assert_eq!(result.unwrap_err(), SchedulerError::NoRuntime);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_fetch_and_periodic_ticks() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        scheduler
            .subscribe(
                "stats",
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(json!({ "n": n })) }
                },
                |_, _| {},
                Some(Duration::from_secs(10)),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_state_transitions() {
        let scheduler = scheduler();
        assert_eq!(scheduler.connection_state(), ConnectionState::Disconnected);

        scheduler
            .subscribe("stats", || async { Ok(json!({})) }, |_, _| {}, None)
            .unwrap();
        assert_eq!(scheduler.connection_state(), ConnectionState::Connected);

        scheduler.disconnect();
        assert_eq!(scheduler.connection_state(), ConnectionState::Disconnected);
        assert_eq!(scheduler.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_dispose_rejects_new_subscriptions() {
        let scheduler = scheduler();
        scheduler.dispose();
        let result = scheduler.subscribe("stats", || async { Ok(json!({})) }, |_, _| {}, None);
        assert_eq!(result.unwrap_err(), SchedulerError::Disposed);
        scheduler.connect();
        assert_eq!(scheduler.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_removes_empty_channel() {
        let scheduler = scheduler();
        let a = scheduler
            .subscribe("stats", || async { Ok(json!({})) }, |_, _| {}, None)
            .unwrap();
        let b = scheduler
            .subscribe("stats", || async { Ok(json!({})) }, |_, _| {}, None)
            .unwrap();

        assert!(scheduler.unsubscribe(a));
        assert!(!scheduler.unsubscribe(a));
        assert_eq!(scheduler.channel_count(), 1);
        assert_eq!(scheduler.subscription_state(a), SubscriptionState::Removed);
        assert_eq!(scheduler.subscription_state(b), SubscriptionState::Active);

        assert!(scheduler.unsubscribe(b));
        assert_eq!(scheduler.channel_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_channel() {
        let scheduler = scheduler();
        for _ in 0..3 {
            scheduler
                .subscribe("events", || async { Ok(json!([])) }, |_, _| {}, None)
                .unwrap();
        }
        scheduler
            .subscribe("stats", || async { Ok(json!({})) }, |_, _| {}, None)
            .unwrap();

        assert_eq!(scheduler.unsubscribe_channel("events"), 3);
        assert_eq!(scheduler.unsubscribe_channel("events"), 0);
        assert_eq!(scheduler.active_subscription_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_stream_delivers_updates() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let (_id, mut updates) = scheduler
            .subscribe_stream(
                "stats",
                SubscribeOptions::every(Duration::from_secs(5)),
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(json!({ "total": n / 2 })) }
                },
            )
            .unwrap();

        let first = updates.recv().await.unwrap();
        assert_eq!(first.data, json!({"total": 0}));
        assert!(first.changed_fields.is_empty());

        let second = updates.recv().await.unwrap();
        assert_eq!(second.data, json!({"total": 1}));
        assert_eq!(second.changed_fields, vec!["total"]);
        // Ticks 0 and 1 yield the same data; only two updates were sent for three fetches.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_all_fetches_every_channel() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));

        for channel in ["stats", "events"] {
            let counter = Arc::clone(&calls);
            scheduler
                .subscribe(
                    channel,
                    move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        async { Ok(json!({})) }
                    },
                    |_, _| {},
                    Some(Duration::from_secs(60)),
                )
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        scheduler.refresh_all().await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        scheduler.refresh("stats").await;
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_update_keeps_timer_polling() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let deliveries = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&deliveries);

        let id = scheduler
            .subscribe(
                "stats",
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(json!({ "n": n })) }
                },
                move |_, _| {
                    if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first render failed");
                    }
                },
                Some(Duration::from_secs(1)),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(scheduler.subscription_state(id), SubscriptionState::Active);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(deliveries.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_poisoned_registry_is_still_usable() {
        let scheduler = scheduler();
        let poisoner = scheduler.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.channels();
            panic!("poison the registry");
        })
        .join();

        assert!(scheduler.inner.channels.is_poisoned());
        assert_eq!(scheduler.channel_count(), 0);
        assert!(!scheduler.unsubscribe(SubscriptionId::new()));
    }
}
