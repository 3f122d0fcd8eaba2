//! Eased numeric transitions for dashboard counters.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::SchedulerError;

/// Default transition length.
pub const DEFAULT_DURATION: Duration = Duration::from_millis(1000);

/// Animates a displayed integer from `from` to `to` with ease-out cubic timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimatedCounter {
    pub from: i64,
    pub to: i64,
    pub duration: Duration,
}

impl AnimatedCounter {
    pub fn new(from: i64, to: i64, duration: Duration) -> Self {
        Self { from, to, duration }
    }

    /// Transition over [`DEFAULT_DURATION`].
    pub fn between(from: i64, to: i64) -> Self {
        Self::new(from, to, DEFAULT_DURATION)
    }

    /// Displayed value `elapsed` into the transition.
    pub fn value_at(&self, elapsed: Duration) -> i64 {
        if self.duration.is_zero() || elapsed >= self.duration {
            return self.to;
        }
        let progress = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        let eased = 1.0 - (1.0 - progress).powi(3);
        let difference = self.to as f64 - self.from as f64;
        (self.from as f64 + difference * eased + 0.5).floor() as i64
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.duration
    }

    /// Continue from the currently displayed value towards a new target.
    pub fn retarget(&self, elapsed: Duration, to: i64) -> Self {
        Self::new(self.value_at(elapsed), to, self.duration)
    }

    /// Drive the transition on a tokio task, publishing one value per frame.
    ///
    /// The receiver always ends on `to`. The task stops early when every
    /// receiver is dropped.
    pub fn spawn(self, frame_interval: Duration) -> Result<watch::Receiver<i64>, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        let (tx, rx) = watch::channel(self.from);

        if self.from == self.to {
            tx.send_replace(self.to);
            return Ok(rx);
        }

        runtime.spawn(async move {
            let started = Instant::now();
            let mut frames = tokio::time::interval(frame_interval.max(Duration::from_millis(1)));
            frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                frames.tick().await;
                if tx.is_closed() {
                    break;
                }
                let elapsed = started.elapsed();
                tx.send_if_modified(|value| {
                    let next = self.value_at(elapsed);
                    let modified = *value != next;
                    *value = next;
                    modified
                });
                if self.is_finished(elapsed) {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
