//! Token management for authenticated requests.
//!
//! The identity service issues tokens; this module mirrors the last issued
//! token locally and resolves it for the request executor.

pub mod identity;
pub mod mirrored;
pub mod token;

pub use identity::{RefreshResponse, RefreshTokenIdentity, StaticIdentity};
pub use mirrored::MirroredTokenProvider;
pub use token::StoredToken;
