//! Mock implementations for testing.
//!
//! # Available Mocks
//!
//! - [`MockHttpClient`] - HTTP client with scripted response sequences
//! - [`InMemoryTokenStore`] - In-memory token mirror
//! - [`MockIdentity`] - Scripted identity provider
//! - [`MockTokenProvider`] - Token provider with call counters

pub mod http;
pub mod token;

pub use http::{MockHttpClient, MockResponse, RecordedRequest};
pub use token::{InMemoryTokenStore, MockIdentity, MockTokenProvider};
