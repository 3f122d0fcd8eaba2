//! Polling subscriptions with change detection.
//!
//! The [`SubscriptionScheduler`] runs one timer per subscription, compares
//! each fetched snapshot against the last delivered one and only notifies
//! consumers when something changed. [`LiveChannel`] and
//! [`AnimatedCounter`] are dashboard-facing helpers on top of it.

mod counter;
mod diff;
mod live;
mod scheduler;
mod subscription;

pub use counter::{AnimatedCounter, DEFAULT_DURATION};
pub use diff::{diff, ChangeDetector, DiffMode, ROOT_FIELD};
pub use live::{LiveChannel, LiveOptions, LiveState, DEFAULT_HIGHLIGHT};
pub use scheduler::SubscriptionScheduler;
pub use subscription::{
    ChannelUpdate, ConnectionState, SubscribeOptions, SubscriptionId, SubscriptionState,
};
