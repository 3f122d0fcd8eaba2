//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`HttpClient`] - HTTP transport used by the request executor
//! - [`TokenProvider`] - Bearer token resolution with forced refresh
//! - [`IdentityProvider`] - The external service issuing tokens
//! - [`TokenStore`] - Persistent mirror of the last issued token

pub mod http;
pub mod token;

pub use http::{Headers, HttpClient, HttpError, Method, Request, Response};
pub use token::{IdentityProvider, TokenError, TokenProvider, TokenStore};
