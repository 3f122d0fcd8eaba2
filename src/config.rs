//! Sync layer configuration.
//!
//! Use the builder pattern to customize behavior, or [`SyncConfig::from_env`]
//! to read overrides from `PORTAL_*` environment variables.
//!
//! # Example
//!
//! ```
//! use portal_sync::SyncConfig;
//! use std::time::Duration;
//!
//! let config = SyncConfig::default()
//!     .with_api_base_url("https://portal.example.org")
//!     .with_default_poll_interval(Duration::from_secs(30));
//! assert_eq!(config.max_auth_attempts, 5);
//! ```

use std::str::FromStr;
use std::time::Duration;

pub const ENV_API_BASE: &str = "PORTAL_API_BASE";
pub const ENV_POLL_INTERVAL_MS: &str = "PORTAL_POLL_INTERVAL_MS";
pub const ENV_MAX_AUTH_ATTEMPTS: &str = "PORTAL_MAX_AUTH_ATTEMPTS";
pub const ENV_MAX_RATE_LIMIT_ATTEMPTS: &str = "PORTAL_MAX_RATE_LIMIT_ATTEMPTS";
pub const ENV_INITIAL_BACKOFF_MS: &str = "PORTAL_INITIAL_BACKOFF_MS";
pub const ENV_MAX_BACKOFF_MS: &str = "PORTAL_MAX_BACKOFF_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "PORTAL_REQUEST_TIMEOUT_MS";
pub const ENV_ACTIVITY_LOG: &str = "PORTAL_ACTIVITY_LOG";

/// Default backend base URL for local development.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:5000";

/// Configuration shared by the executor, the cache and the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL that relative endpoints are resolved against
    pub api_base_url: String,
    /// Poll interval used when a subscriber does not pick one (default: 15 s)
    pub default_poll_interval: Duration,
    /// Total tries when the server keeps answering 401 (default: 5)
    pub max_auth_attempts: u32,
    /// Total tries when the server keeps answering 429 (default: 5)
    pub max_rate_limit_attempts: u32,
    /// First 429 backoff without a server hint (default: 1 s)
    pub initial_backoff: Duration,
    /// Upper bound on any 429 backoff (default: 15 s)
    pub max_backoff: Duration,
    /// Per-attempt network timeout, `None` disables it (default: 30 s)
    pub request_timeout: Option<Duration>,
    /// Consecutive fetch failures that open a subscription's circuit (default: 3)
    pub max_consecutive_failures: u32,
    /// Log subscription activity at info level (default: true)
    pub activity_log: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            default_poll_interval: Duration::from_secs(15),
            max_auth_attempts: 5,
            max_rate_limit_attempts: 5,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(15000),
            request_timeout: Some(Duration::from_secs(30)),
            max_consecutive_failures: 3,
            activity_log: true,
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API base URL. A trailing slash is dropped.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_poll_interval(mut self, interval: Duration) -> Self {
        self.default_poll_interval = interval;
        self
    }

    pub fn with_max_auth_attempts(mut self, attempts: u32) -> Self {
        self.max_auth_attempts = attempts.max(1);
        self
    }

    pub fn with_max_rate_limit_attempts(mut self, attempts: u32) -> Self {
        self.max_rate_limit_attempts = attempts.max(1);
        self
    }

    /// Set the initial and maximum 429 backoff.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_consecutive_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = failures.max(1);
        self
    }

    pub fn with_activity_log(mut self, enabled: bool) -> Self {
        self.activity_log = enabled;
        self
    }

    /// Resolve an endpoint against the base URL.
    ///
    /// Absolute URLs are returned unchanged.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Defaults overridden by `PORTAL_*` environment variables.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            config = config.with_api_base_url(base.trim());
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_POLL_INTERVAL_MS).filter(|ms| *ms > 0) {
            config.default_poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32>(&lookup, ENV_MAX_AUTH_ATTEMPTS) {
            config = config.with_max_auth_attempts(n);
        }
        if let Some(n) = parse_var::<u32>(&lookup, ENV_MAX_RATE_LIMIT_ATTEMPTS) {
            config = config.with_max_rate_limit_attempts(n);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_INITIAL_BACKOFF_MS) {
            config.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_MAX_BACKOFF_MS) {
            config.max_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(value) = lookup(ENV_ACTIVITY_LOG) {
            match value.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "off" | "no" => config.activity_log = false,
                "1" | "true" | "on" | "yes" => config.activity_log = true,
                _ => tracing::warn!(var = ENV_ACTIVITY_LOG, value = %value, "Ignoring invalid boolean"),
            }
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring invalid numeric setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_sync_config_default() {
        let config = SyncConfig::default();
        assert_eq!(config.api_base_url, "http://127.0.0.1:5000");
        assert_eq!(config.default_poll_interval, Duration::from_secs(15));
        assert_eq!(config.max_auth_attempts, 5);
        assert_eq!(config.max_rate_limit_attempts, 5);
        assert_eq!(config.initial_backoff, Duration::from_millis(1000));
        assert_eq!(config.max_backoff, Duration::from_millis(15000));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_consecutive_failures, 3);
        assert!(config.activity_log);
    }

    #[test]
    fn test_builder_clamps_attempts() {
        let config = SyncConfig::new()
            .with_max_auth_attempts(0)
            .with_max_rate_limit_attempts(0)
            .with_max_consecutive_failures(0);
        assert_eq!(config.max_auth_attempts, 1);
        assert_eq!(config.max_rate_limit_attempts, 1);
        assert_eq!(config.max_consecutive_failures, 1);
    }

    #[test]
    fn test_resolve_url() {
        let config = SyncConfig::new().with_api_base_url("http://api.test/");
        assert_eq!(config.resolve_url("/stats"), "http://api.test/stats");
        assert_eq!(config.resolve_url("stats"), "http://api.test/stats");
        assert_eq!(
            config.resolve_url("https://other.test/x"),
            "https://other.test/x"
        );
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            (ENV_API_BASE, "https://portal.test/"),
            (ENV_POLL_INTERVAL_MS, "2500"),
            (ENV_MAX_AUTH_ATTEMPTS, "3"),
            (ENV_INITIAL_BACKOFF_MS, "50"),
            (ENV_MAX_BACKOFF_MS, "400"),
            (ENV_REQUEST_TIMEOUT_MS, "0"),
            (ENV_ACTIVITY_LOG, "false"),
        ]));

        assert_eq!(config.api_base_url, "https://portal.test");
        assert_eq!(config.default_poll_interval, Duration::from_millis(2500));
        assert_eq!(config.max_auth_attempts, 3);
        assert_eq!(config.max_rate_limit_attempts, 5);
        assert_eq!(config.initial_backoff, Duration::from_millis(50));
        assert_eq!(config.max_backoff, Duration::from_millis(400));
        assert_eq!(config.request_timeout, None);
        assert!(!config.activity_log);
    }

    #[test]
    fn test_from_lookup_ignores_invalid_values() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            (ENV_POLL_INTERVAL_MS, "soon"),
            (ENV_MAX_RATE_LIMIT_ATTEMPTS, "-1"),
            (ENV_ACTIVITY_LOG, "maybe"),
        ]));
        assert_eq!(config, SyncConfig::default());
    }
}
