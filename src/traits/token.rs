//! Token provider and token store abstractions.
//!
//! The identity service is an external collaborator. These traits let the
//! executor obtain bearer tokens without reaching for ambient globals, and let
//! tests substitute in-memory implementations.

use async_trait::async_trait;

use crate::auth::StoredToken;

/// Token operation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to load token: {0}")]
    LoadFailed(String),

    #[error("Failed to save token: {0}")]
    SaveFailed(String),

    #[error("Failed to clear token: {0}")]
    ClearFailed(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Source of bearer tokens for the request executor.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Resolve a token.
    ///
    /// With `force_refresh == false` a locally mirrored token may be returned.
    /// With `force_refresh == true` the identity provider must be asked for a
    /// fresh one. `Ok(None)` means the user is not signed in.
    async fn resolve_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError>;

    /// Drop any locally mirrored token. Called on 401 and on sign-out.
    async fn invalidate(&self) -> Result<(), TokenError>;
}

/// External identity service that issues and refreshes tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Return the current identity token, refreshing it when forced.
    async fn id_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError>;
}

/// Persistent mirror of the last issued token.
///
/// # Returns
/// - `Ok(Some(token))` if a token is stored
/// - `Ok(None)` if nothing is stored
/// - `Err(error)` if the backing storage failed
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<StoredToken>, TokenError>;

    async fn save(&self, token: &StoredToken) -> Result<(), TokenError>;

    async fn clear(&self) -> Result<(), TokenError>;
}
