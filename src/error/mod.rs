//! Error types for the sync layer.
//!
//! - **Error Categories**: [`ErrorCategory`] classifies failures for retry and
//!   messaging decisions
//! - **Request Errors**: [`RequestError`] is the outcome of one logical request
//! - **Scheduler Errors**: [`SchedulerError`] covers subscription registration
//!
//! Transport and token failures are defined next to their traits
//! ([`HttpError`](crate::traits::HttpError), [`TokenError`](crate::traits::TokenError))
//! and convert into [`RequestError`].
//!
//! # Error Categories
//!
//! | Category | Description | Retryable |
//! |----------|-------------|-----------|
//! | Auth | Missing or rejected credentials | No |
//! | RateLimit | HTTP 429 after all retries | Yes |
//! | Client | Other HTTP 4xx | No |
//! | Server | HTTP 5xx | Yes |
//! | Network | Connection, DNS, timeout | Yes |
//! | Internal | Request task failure | No |

mod category;
mod request;

pub use category::ErrorCategory;
pub use request::RequestError;

/// Subscription registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// Subscriptions need a tokio runtime to drive their timers.
    #[error("No tokio runtime available to drive subscription timers")]
    NoRuntime,

    /// The scheduler was disposed and accepts no new subscriptions.
    #[error("Scheduler has been disposed")]
    Disposed,
}

/// Result type for request execution.
pub type RequestResult<T> = Result<T, RequestError>;
