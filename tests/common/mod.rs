//! Common test utilities for integration tests.
//!
//! Fixtures for building executors against a wiremock server, scripted fetch
//! closures for the scheduler, and a recorder for update callbacks.
//!
//! # Example
//!
//! ```ignore
//! let server = MockServer::start().await;
//! let executor = executor_for(&server, MockTokenProvider::new(Some("tok"), vec![]));
//! ```

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{ready, Ready};
use serde_json::Value;
use wiremock::MockServer;

pub use portal_sync::adapters::{MockHttpClient, MockResponse, MockTokenProvider, ReqwestHttpClient};
use portal_sync::{AuthenticatedExecutor, RequestError, SyncConfig};

/// Config pointed at `base` with fast backoff and quiet activity logging.
pub fn test_config(base: &str) -> SyncConfig {
    SyncConfig::default()
        .with_api_base_url(base)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(50))
        .with_activity_log(false)
}

/// Executor talking to a wiremock server over real HTTP.
pub fn executor_for(
    server: &MockServer,
    tokens: MockTokenProvider,
) -> AuthenticatedExecutor<ReqwestHttpClient, MockTokenProvider> {
    AuthenticatedExecutor::new(ReqwestHttpClient::new(), tokens, test_config(&server.uri()))
}

/// A fetch closure replaying `results` in order; the last result repeats.
#[derive(Clone)]
pub struct ScriptedFetch {
    results: Arc<Mutex<VecDeque<Result<Value, RequestError>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedFetch {
    pub fn new(results: Vec<Result<Value, RequestError>>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always(result: Result<Value, RequestError>) -> Self {
        Self::new(vec![result])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The closure to hand to `subscribe`.
    pub fn closure(&self) -> impl Fn() -> Ready<Result<Value, RequestError>> + Send + Sync + 'static {
        let this = self.clone();
        move || {
            this.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = this.results.lock().unwrap();
            let next = if results.len() > 1 {
                results.pop_front()
            } else {
                results.front().cloned()
            };
            ready(next.unwrap_or_else(|| Ok(Value::Null)))
        }
    }
}

/// Records every update callback invocation.
#[derive(Clone, Default)]
pub struct UpdateRecorder {
    updates: Arc<Mutex<Vec<(Value, Vec<String>)>>>,
}

impl UpdateRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> impl Fn(&Value, &[String]) + Send + Sync + 'static {
        let updates = Arc::clone(&self.updates);
        move |data, changed| {
            updates
                .lock()
                .unwrap()
                .push((data.clone(), changed.to_vec()));
        }
    }

    pub fn count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<(Value, Vec<String>)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<(Value, Vec<String>)> {
        self.updates.lock().unwrap().last().cloned()
    }
}

/// A generic server error result for fetch scripts.
pub fn server_error() -> Result<Value, RequestError> {
    Err(RequestError::Http {
        status: 500,
        message: "Internal Server Error".to_string(),
        payload: None,
    })
}
