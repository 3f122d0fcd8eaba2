//! Token provider backed by a local mirror and an identity provider.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::StoredToken;
use crate::traits::{IdentityProvider, TokenError, TokenProvider, TokenStore};

/// Resolves tokens from a [`TokenStore`] mirror, falling back to the
/// [`IdentityProvider`] when the mirror is empty or a refresh is forced.
///
/// Tokens obtained from the identity provider are written back to the mirror.
/// A failing mirror never blocks token resolution: load and save errors are
/// logged and the identity provider's answer is used.
pub struct MirroredTokenProvider<S, I> {
    store: S,
    identity: I,
}

impl<S: TokenStore, I: IdentityProvider> MirroredTokenProvider<S, I> {
    pub fn new(store: S, identity: I) -> Self {
        Self { store, identity }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    async fn read_mirror(&self) -> Option<String> {
        match self.store.load().await {
            Ok(Some(token)) if token.has_token() => Some(token.access_token),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Unable to read mirrored token");
                None
            }
        }
    }
}

#[async_trait]
impl<S: TokenStore, I: IdentityProvider> TokenProvider for MirroredTokenProvider<S, I> {
    async fn resolve_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError> {
        if !force_refresh {
            if let Some(token) = self.read_mirror().await {
                return Ok(Some(token));
            }
        }

        debug!(force_refresh, "Requesting token from identity provider");
        let token = self.identity.id_token(force_refresh).await?;

        if let Some(ref access_token) = token {
            if let Err(e) = self.store.save(&StoredToken::new(access_token.clone())).await {
                warn!(error = %e, "Unable to persist token mirror");
            }
        }

        Ok(token)
    }

    async fn invalidate(&self) -> Result<(), TokenError> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{InMemoryTokenStore, MockIdentity};

    #[tokio::test]
    async fn test_uses_mirror_without_calling_identity() {
        let store = InMemoryTokenStore::with_token(StoredToken::new("mirrored"));
        let identity = MockIdentity::with_tokens(vec!["fresh"]);
        let provider = MirroredTokenProvider::new(store, identity);

        let token = provider.resolve_token(false).await.unwrap();
        assert_eq!(token.as_deref(), Some("mirrored"));
        assert_eq!(provider.identity().call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_mirror_falls_back_and_persists() {
        let provider =
            MirroredTokenProvider::new(InMemoryTokenStore::new(), MockIdentity::with_tokens(vec!["issued"]));

        let token = provider.resolve_token(false).await.unwrap();
        assert_eq!(token.as_deref(), Some("issued"));

        let stored = provider.store().load().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "issued");
        assert_eq!(provider.identity().forced_calls(), 0);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_mirror() {
        let store = InMemoryTokenStore::with_token(StoredToken::new("stale"));
        let provider = MirroredTokenProvider::new(store, MockIdentity::with_tokens(vec!["fresh"]));

        let token = provider.resolve_token(true).await.unwrap();
        assert_eq!(token.as_deref(), Some("fresh"));
        assert_eq!(provider.identity().forced_calls(), 1);
        assert_eq!(
            provider.store().load().await.unwrap().unwrap().access_token,
            "fresh"
        );
    }

    #[tokio::test]
    async fn test_signed_out_identity_returns_none() {
        let provider = MirroredTokenProvider::new(InMemoryTokenStore::new(), MockIdentity::signed_out());
        assert!(provider.resolve_token(false).await.unwrap().is_none());
        assert!(provider.store().load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_clears_mirror() {
        let store = InMemoryTokenStore::with_token(StoredToken::new("mirrored"));
        let provider = MirroredTokenProvider::new(store, MockIdentity::signed_out());

        provider.invalidate().await.unwrap();
        assert!(provider.store().load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_mirror_does_not_block_resolution() {
        let store = InMemoryTokenStore::new();
        store.set_load_should_fail(true);
        store.set_save_should_fail(true);
        let provider = MirroredTokenProvider::new(store, MockIdentity::with_tokens(vec!["issued"]));

        let token = provider.resolve_token(false).await.unwrap();
        assert_eq!(token.as_deref(), Some("issued"));
    }
}
