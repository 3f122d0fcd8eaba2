//! Concrete implementations of trait abstractions.
//!
//! # Adapters
//!
//! - [`ReqwestHttpClient`] - HTTP client using reqwest
//! - [`FileTokenStore`] - File-based token mirror
//!
//! The [`mock`] submodule provides test doubles for every trait.

pub mod file_token_store;
pub mod mock;
pub mod reqwest_http;

pub use file_token_store::FileTokenStore;
pub use mock::{InMemoryTokenStore, MockHttpClient, MockIdentity, MockResponse, MockTokenProvider};
pub use reqwest_http::ReqwestHttpClient;
