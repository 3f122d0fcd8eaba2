//! portal-sync - resilient data synchronization for the volunteer portal
//!
//! - [`executor`]: authenticated requests with 401 refresh and 429 backoff
//! - [`cache`]: in-flight coalescing and TTL caching of responses
//! - [`sync`]: polled channel subscriptions with change detection
//! - [`service`]: one facade wiring the above from a [`SyncConfig`]
//!
//! The HTTP transport and token sources sit behind the traits in [`traits`],
//! with production and test implementations in [`adapters`].

pub mod adapters;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod request;
pub mod service;
pub mod sync;
pub mod traits;

pub use config::SyncConfig;
pub use error::{ErrorCategory, RequestError, RequestResult, SchedulerError};
pub use executor::AuthenticatedExecutor;
pub use request::{RequestKey, RequestOptions};
pub use service::SyncService;
pub use sync::{
    ChangeDetector, ConnectionState, DiffMode, LiveChannel, LiveOptions, LiveState,
    SubscriptionId, SubscriptionScheduler, SubscriptionState,
};
pub use traits::{HttpClient, IdentityProvider, Method, TokenError, TokenProvider, TokenStore};
