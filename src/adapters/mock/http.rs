//! Mock HTTP client for testing.
//!
//! Responses are scripted per URL and consumed in order, so a test can
//! describe a sequence such as `[401, 200]` or "always 429". Every request is
//! recorded for verification.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{Headers, HttpClient, HttpError, Request, Response};

/// A recorded HTTP request for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method name
    pub method: String,
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request body
    pub body: Option<String>,
}

impl RecordedRequest {
    /// The bearer token sent with the request, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .and_then(|(_, v)| v.strip_prefix("Bearer "))
    }
}

/// Configuration for a mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a response (any status)
    Success(Response),
    /// Fail at the transport level
    Error(HttpError),
}

impl MockResponse {
    /// A response with a JSON body.
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        MockResponse::Success(Response::new(status, Bytes::from(body.to_string())))
    }

    /// A response with a raw text body.
    pub fn text(status: u16, body: &str) -> Self {
        MockResponse::Success(Response::new(status, Bytes::from(body.to_string())))
    }

    /// A response with an empty body.
    pub fn status(status: u16) -> Self {
        MockResponse::Success(Response::new(status, Bytes::new()))
    }

    /// Add a response header. No effect on transport errors.
    pub fn with_header(self, name: &str, value: &str) -> Self {
        match self {
            MockResponse::Success(mut response) => {
                response.headers.insert(name.to_string(), value.to_string());
                MockResponse::Success(response)
            }
            other => other,
        }
    }
}

/// Mock HTTP client for testing.
///
/// Scripted responses for a URL are consumed front to back; the last one is
/// sticky and repeats for every further request. URLs are matched exactly
/// first, then by prefix.
///
/// # Example
///
/// ```ignore
/// let client = MockHttpClient::new();
/// client.script(
///     "http://api/stats",
///     vec![MockResponse::status(401), MockResponse::json(200, json!({"a": 1}))],
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    /// Scripted responses by URL pattern
    scripts: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    /// Default response when no specific match
    default_response: Arc<Mutex<Option<MockResponse>>>,
    /// Recorded requests for verification
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    /// Artificial latency applied before answering
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single sticky response for a URL.
    pub fn set_response(&self, url: &str, response: MockResponse) {
        self.script(url, vec![response]);
    }

    /// Replace the scripted response sequence for a URL.
    pub fn script(&self, url: &str, responses: Vec<MockResponse>) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.insert(url.to_string(), responses.into_iter().collect());
    }

    /// Set a default response for URLs without specific matches.
    pub fn set_default_response(&self, response: MockResponse) {
        *self.default_response.lock().unwrap() = Some(response);
    }

    /// Delay every response by `delay`. Works with paused tokio time.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Get all recorded requests.
    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of requests received for one exact URL.
    pub fn request_count_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    /// Clear all recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn record_request(&self, request: &Request) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method.as_str().to_string(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });
    }

    fn next_from(queue: &mut VecDeque<MockResponse>) -> Option<MockResponse> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    /// Take the next response for a URL.
    fn next_response(&self, url: &str) -> Option<MockResponse> {
        {
            let mut scripts = self.scripts.lock().unwrap();

            if let Some(queue) = scripts.get_mut(url) {
                return Self::next_from(queue);
            }

            let prefix = scripts
                .keys()
                .filter(|pattern| url.starts_with(pattern.as_str()))
                .max_by_key(|pattern| pattern.len())
                .cloned();
            if let Some(prefix) = prefix {
                if let Some(queue) = scripts.get_mut(&prefix) {
                    return Self::next_from(queue);
                }
            }
        }

        self.default_response.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: &Request) -> Result<Response, HttpError> {
        self.record_request(request);
        let response = self.next_response(&request.url);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match response {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            None => Err(HttpError::Other(format!(
                "No mock response for URL: {}",
                request.url
            ))),
        }
    }
}
