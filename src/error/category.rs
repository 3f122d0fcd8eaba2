//! Error category classification.
//!
//! Categories drive retry decisions and user messaging without callers having
//! to match on every [`RequestError`](super::RequestError) variant.

use std::fmt;

/// High-level categorization of errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing, rejected or unrefreshable credentials.
    Auth,

    /// The server asked the client to slow down (HTTP 429).
    RateLimit,

    /// The request itself was rejected (HTTP 4xx other than 401/429).
    Client,

    /// Backend failure (HTTP 5xx).
    Server,

    /// Connection, DNS or timeout problems.
    Network,

    /// A failure inside this crate, such as a panicked request task.
    Internal,
}

impl ErrorCategory {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCategory::Auth,
            429 => ErrorCategory::RateLimit,
            500..=599 => ErrorCategory::Server,
            _ => ErrorCategory::Client,
        }
    }

    /// Returns true if errors in this category are generally transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::Server | ErrorCategory::RateLimit
        )
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Client => "client",
            ErrorCategory::Server => "server",
            ErrorCategory::Network => "network",
            ErrorCategory::Internal => "internal",
        }
    }

    /// Returns suggested recovery actions for this category.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "Try signing out and signing back in",
            ErrorCategory::RateLimit => "Please wait a moment before trying again",
            ErrorCategory::Client => "Please check your input and try again",
            ErrorCategory::Server => {
                "The server may be experiencing issues. Please try again later"
            }
            ErrorCategory::Network => "Check your internet connection and try again",
            ErrorCategory::Internal => {
                "This may be a bug. Please report this issue if it persists"
            }
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Server.is_retryable());
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::Client.is_retryable());
        assert!(!ErrorCategory::Internal.is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(ErrorCategory::from_status(401), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::from_status(429), ErrorCategory::RateLimit);
        assert_eq!(ErrorCategory::from_status(404), ErrorCategory::Client);
        assert_eq!(ErrorCategory::from_status(403), ErrorCategory::Client);
        assert_eq!(ErrorCategory::from_status(503), ErrorCategory::Server);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(format!("{}", ErrorCategory::RateLimit), "rate_limit");
        assert_eq!(format!("{}", ErrorCategory::Network), "network");
    }

    #[test]
    fn test_recovery_hints_non_empty() {
        for category in [
            ErrorCategory::Auth,
            ErrorCategory::RateLimit,
            ErrorCategory::Client,
            ErrorCategory::Server,
            ErrorCategory::Network,
            ErrorCategory::Internal,
        ] {
            assert!(!category.recovery_hint().is_empty());
        }
    }
}
