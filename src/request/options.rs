//! Per-request options.

use std::time::Duration;

use serde::Serialize;

use crate::traits::{Headers, Method};

/// Options for one logical request through the executor.
///
/// # Example
///
/// ```
/// use portal_sync::request::RequestOptions;
/// use std::time::Duration;
///
/// let options = RequestOptions::get().with_cache_ttl(Duration::from_secs(60));
/// assert!(options.cache_ttl.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    /// Caller headers; `Content-Type: application/json` is added unless set
    pub headers: Headers,
    pub body: Option<String>,
    /// Cache successful GET responses for this long
    pub cache_ttl: Option<Duration>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    /// A POST with a JSON body.
    pub fn post_json<B: Serialize>(body: &B) -> Result<Self, serde_json::Error> {
        Self::new(Method::Post).with_json(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_string(body)?);
        Ok(self)
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// TTL to cache the response with: only for GET and only when positive.
    pub fn effective_ttl(&self) -> Option<Duration> {
        if !self.method.is_cacheable() {
            return None;
        }
        self.cache_ttl.filter(|ttl| !ttl.is_zero())
    }
}
