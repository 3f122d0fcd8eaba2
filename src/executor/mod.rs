//! Authenticated request execution.
//!
//! [`AuthenticatedExecutor`] turns one logical call into as many HTTP attempts
//! as needed:
//!
//! - a bearer token is attached to every attempt
//! - 401 invalidates the mirrored token, forces a refresh and retries
//! - 429 waits (server hint or jittered exponential backoff) and retries
//! - every other status is final
//!
//! Identical concurrent calls are coalesced through the shared
//! [`RequestCache`], which also serves and stores cached GET responses.

pub mod backoff;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CachePolicy, RequestCache};
use crate::config::SyncConfig;
use crate::error::RequestError;
use crate::request::{RequestKey, RequestOptions};
use crate::traits::{HttpClient, HttpError, Request, Response, TokenProvider};

/// Executes requests against the backend with auth and rate-limit recovery.
///
/// Cloning is cheap; clones share the HTTP client, token provider and cache.
pub struct AuthenticatedExecutor<H, P> {
    http: Arc<H>,
    tokens: Arc<P>,
    cache: RequestCache<Value>,
    config: Arc<SyncConfig>,
}

impl<H, P> Clone for AuthenticatedExecutor<H, P> {
    fn clone(&self) -> Self {
        Self {
            http: Arc::clone(&self.http),
            tokens: Arc::clone(&self.tokens),
            cache: self.cache.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<H, P> AuthenticatedExecutor<H, P>
where
    H: HttpClient + 'static,
    P: TokenProvider + 'static,
{
    pub fn new(http: H, tokens: P, config: SyncConfig) -> Self {
        Self::with_parts(Arc::new(http), Arc::new(tokens), RequestCache::new(), config)
    }

    /// Build from shared parts, e.g. to share one cache between executors.
    pub fn with_parts(
        http: Arc<H>,
        tokens: Arc<P>,
        cache: RequestCache<Value>,
        config: SyncConfig,
    ) -> Self {
        Self {
            http,
            tokens,
            cache,
            config: Arc::new(config),
        }
    }

    pub fn cache(&self) -> &RequestCache<Value> {
        &self.cache
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn token_provider(&self) -> &P {
        &self.tokens
    }

    /// Execute one logical request and return the parsed JSON body.
    ///
    /// `endpoint` is resolved against the configured base URL unless it is
    /// already absolute.
    pub async fn execute(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Value, RequestError> {
        let url = self.config.resolve_url(endpoint);
        let key = RequestKey::new(
            options.method,
            &url,
            &options.headers,
            options.body.as_deref(),
        );
        let policy = if options.method.is_cacheable() {
            CachePolicy::cached(options.effective_ttl())
        } else {
            CachePolicy::bypass()
        };

        let this = self.clone();
        self.cache
            .get_or_fetch(key, policy, async move { this.perform(&url, &options).await })
            .await
    }

    /// Execute and deserialize the body into `T`.
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, RequestError> {
        let value = self.execute(endpoint, options).await?;
        serde_json::from_value(value).map_err(|e| RequestError::Internal {
            message: format!("Unexpected response shape: {}", e),
        })
    }

    /// The retry loop for one logical request. Runs once per deduplicated key.
    async fn perform(&self, url: &str, options: &RequestOptions) -> Result<Value, RequestError> {
        let mut token = match self.tokens.resolve_token(false).await? {
            Some(token) => token,
            None => {
                warn!(url = %url, "Request attempted without authentication");
                return Err(RequestError::AuthRequired);
            }
        };

        let mut auth_attempts: u32 = 0;
        let mut rate_limit_attempts: u32 = 0;

        loop {
            let request = build_request(url, options, &token);
            let reply = self.send(&request).await?;

            match reply.status {
                401 => {
                    auth_attempts += 1;
                    if auth_attempts >= self.config.max_auth_attempts {
                        warn!(url = %url, attempts = auth_attempts, "Authentication retries exhausted");
                        return Err(RequestError::AuthExhausted {
                            attempts: auth_attempts,
                        });
                    }

                    debug!(url = %url, attempt = auth_attempts, "Token rejected, refreshing");
                    if let Err(e) = self.tokens.invalidate().await {
                        warn!(error = %e, "Failed to invalidate mirrored token");
                    }
                    match self.tokens.resolve_token(true).await? {
                        Some(fresh) => token = fresh,
                        None => return Err(response::http_error(&reply)),
                    }
                }
                429 => {
                    rate_limit_attempts += 1;
                    let hint = backoff::retry_after(&reply, chrono::Utc::now());
                    if rate_limit_attempts >= self.config.max_rate_limit_attempts {
                        warn!(url = %url, attempts = rate_limit_attempts, "Rate limit retries exhausted");
                        return Err(RequestError::RateLimitExceeded {
                            retry_after_secs: hint.map(ceil_secs),
                            attempts: rate_limit_attempts,
                        });
                    }

                    let delay = backoff::retry_delay(
                        rate_limit_attempts - 1,
                        hint,
                        self.config.initial_backoff,
                        self.config.max_backoff,
                    );
                    warn!(
                        url = %url,
                        attempt = rate_limit_attempts,
                        max_attempts = self.config.max_rate_limit_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ if !reply.is_success() => {
                    debug!(url = %url, status = reply.status, "Request failed");
                    return Err(response::http_error(&reply));
                }
                _ => return Ok(response::parse_success(&reply)),
            }
        }
    }

    /// One network attempt, bounded by the configured timeout.
    async fn send(&self, request: &Request) -> Result<Response, RequestError> {
        debug!(method = %request.method, url = %request.url, "Sending request");
        let timeout_ms = self
            .config
            .request_timeout
            .map(|t| t.as_millis() as u64)
            .unwrap_or(0);

        let result = match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.http.send(request))
                .await
                .map_err(|_| RequestError::Timeout {
                    duration_ms: timeout_ms,
                })?,
            None => self.http.send(request).await,
        };

        result.map_err(|e| match e {
            HttpError::Timeout(_) => RequestError::Timeout {
                duration_ms: timeout_ms,
            },
            other => {
                warn!(url = %request.url, error = %other, "Network error");
                RequestError::Network(other)
            }
        })
    }
}

fn build_request(url: &str, options: &RequestOptions, token: &str) -> Request {
    let mut request = Request::new(options.method, url);
    let has_content_type = options
        .headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case("content-type"));
    if !has_content_type {
        request = request.with_header("Content-Type", "application/json");
    }
    for (name, value) in &options.headers {
        if !name.eq_ignore_ascii_case("authorization") {
            request = request.with_header(name.clone(), value.clone());
        }
    }
    request = request.with_header("Authorization", format!("Bearer {}", token));
    if let Some(ref body) = options.body {
        request = request.with_body(body.clone());
    }
    request
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
