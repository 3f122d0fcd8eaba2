//! Request execution errors.

use serde_json::Value;

use super::ErrorCategory;
use crate::traits::{HttpError, TokenError};

/// Failure of one logical request through the executor.
///
/// Cloneable so that every caller sharing a deduplicated request observes the
/// same error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// No token could be resolved; no network call was made.
    #[error("Authentication required")]
    AuthRequired,

    /// Every attempt was answered with 401 even after refreshing the token.
    #[error("Authentication failed after {attempts} attempts")]
    AuthExhausted { attempts: u32 },

    /// Every attempt was answered with 429.
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded {
        retry_after_secs: Option<u64>,
        attempts: u32,
    },

    /// Non-2xx response other than an exhausted 401/429.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        payload: Option<Value>,
    },

    /// Connection or IO failure before a response arrived.
    #[error("Network error: {0}")]
    Network(HttpError),

    /// A single attempt exceeded the configured request timeout.
    #[error("Request timed out after {duration_ms} ms")]
    Timeout { duration_ms: u64 },

    /// The token provider failed.
    #[error("Token error: {0}")]
    Token(TokenError),

    /// The request task did not complete (panic or abort).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RequestError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RequestError::AuthRequired
            | RequestError::AuthExhausted { .. }
            | RequestError::Token(_) => ErrorCategory::Auth,
            RequestError::RateLimitExceeded { .. } => ErrorCategory::RateLimit,
            RequestError::Http { status, .. } => ErrorCategory::from_status(*status),
            RequestError::Network(_) | RequestError::Timeout { .. } => ErrorCategory::Network,
            RequestError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether trying again later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether the user has to sign in again.
    pub fn requires_reauth(&self) -> bool {
        match self {
            RequestError::AuthRequired | RequestError::AuthExhausted { .. } => true,
            RequestError::Http { status, .. } => *status == 401,
            _ => false,
        }
    }

    /// HTTP status associated with the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Http { status, .. } => Some(*status),
            RequestError::AuthExhausted { .. } => Some(401),
            RequestError::RateLimitExceeded { .. } => Some(429),
            _ => None,
        }
    }

    /// Parsed error body returned by the server, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            RequestError::Http { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            RequestError::AuthRequired => "Authentication required. Please sign in.".to_string(),
            RequestError::AuthExhausted { .. } => {
                "Your session could not be renewed. Please sign in again.".to_string()
            }
            RequestError::RateLimitExceeded {
                retry_after_secs: Some(secs),
                ..
            } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                secs
            ),
            RequestError::RateLimitExceeded { .. } => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            RequestError::Http { message, .. } => message.clone(),
            RequestError::Network(_) => {
                "Unable to connect to the server. Please check your internet connection."
                    .to_string()
            }
            RequestError::Timeout { .. } => {
                "The server took too long to respond. Please try again.".to_string()
            }
            RequestError::Token(_) => {
                "Your credentials could not be read. Please sign in again.".to_string()
            }
            RequestError::Internal { .. } => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

impl From<TokenError> for RequestError {
    fn from(err: TokenError) -> Self {
        RequestError::Token(err)
    }
}

impl From<HttpError> for RequestError {
    fn from(err: HttpError) -> Self {
        RequestError::Network(err)
    }
}
