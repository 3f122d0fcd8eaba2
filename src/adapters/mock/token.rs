//! In-memory token doubles for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::auth::StoredToken;
use crate::traits::{IdentityProvider, TokenError, TokenProvider, TokenStore};

/// In-memory token store.
///
/// Each operation can be switched to fail, to exercise degraded storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenStore {
    token: Arc<Mutex<Option<StoredToken>>>,
    save_should_fail: Arc<Mutex<bool>>,
    load_should_fail: Arc<Mutex<bool>>,
    clear_should_fail: Arc<Mutex<bool>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: StoredToken) -> Self {
        let store = Self::default();
        *store.token.lock().unwrap() = Some(token);
        store
    }

    pub fn set_save_should_fail(&self, should_fail: bool) {
        *self.save_should_fail.lock().unwrap() = should_fail;
    }

    pub fn set_load_should_fail(&self, should_fail: bool) {
        *self.load_should_fail.lock().unwrap() = should_fail;
    }

    pub fn set_clear_should_fail(&self, should_fail: bool) {
        *self.clear_should_fail.lock().unwrap() = should_fail;
    }

    /// Inspect the stored token without going through the trait.
    pub fn get(&self) -> Option<StoredToken> {
        self.token.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>, TokenError> {
        if *self.load_should_fail.lock().unwrap() {
            return Err(TokenError::LoadFailed("Simulated load failure".to_string()));
        }
        Ok(self.token.lock().unwrap().clone())
    }

    async fn save(&self, token: &StoredToken) -> Result<(), TokenError> {
        if *self.save_should_fail.lock().unwrap() {
            return Err(TokenError::SaveFailed("Simulated save failure".to_string()));
        }
        *self.token.lock().unwrap() = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), TokenError> {
        if *self.clear_should_fail.lock().unwrap() {
            return Err(TokenError::ClearFailed("Simulated clear failure".to_string()));
        }
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct IdentityState {
    tokens: VecDeque<Option<String>>,
    calls: usize,
    forced_calls: usize,
}

/// Scripted identity provider.
///
/// Tokens are handed out front to back; the last one repeats. Calls and forced
/// refreshes are counted.
#[derive(Debug, Clone, Default)]
pub struct MockIdentity {
    state: Arc<Mutex<IdentityState>>,
}

impl MockIdentity {
    pub fn with_tokens(tokens: Vec<&str>) -> Self {
        Self::scripted(tokens.into_iter().map(|t| Some(t.to_string())).collect())
    }

    /// An identity provider with no signed-in user.
    pub fn signed_out() -> Self {
        Self::scripted(vec![None])
    }

    pub fn scripted(tokens: Vec<Option<String>>) -> Self {
        let identity = Self::default();
        identity.state.lock().unwrap().tokens = tokens.into_iter().collect();
        identity
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn forced_calls(&self) -> usize {
        self.state.lock().unwrap().forced_calls
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn id_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if force_refresh {
            state.forced_calls += 1;
        }
        let token = if state.tokens.len() > 1 {
            state.tokens.pop_front().flatten()
        } else {
            state.tokens.front().cloned().flatten()
        };
        Ok(token)
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    current: Option<String>,
    refreshed: VecDeque<Option<String>>,
    resolves: usize,
    refreshes: usize,
    invalidations: usize,
    fail_with: Option<TokenError>,
}

/// Token provider double with call counters.
///
/// `resolve_token(false)` returns the current token; `resolve_token(true)`
/// replaces it with the next scripted refresh result (the last one repeats).
#[derive(Debug, Clone, Default)]
pub struct MockTokenProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockTokenProvider {
    /// A provider holding `token`, refreshing to `refreshed` tokens in order.
    pub fn new(token: Option<&str>, refreshed: Vec<Option<&str>>) -> Self {
        let provider = Self::default();
        {
            let mut state = provider.state.lock().unwrap();
            state.current = token.map(str::to_string);
            state.refreshed = refreshed
                .into_iter()
                .map(|t| t.map(str::to_string))
                .collect();
        }
        provider
    }

    /// Make every resolution fail with `error`.
    pub fn failing(error: TokenError) -> Self {
        let provider = Self::default();
        provider.state.lock().unwrap().fail_with = Some(error);
        provider
    }

    pub fn resolve_count(&self) -> usize {
        self.state.lock().unwrap().resolves
    }

    /// Number of forced refreshes performed.
    pub fn refresh_count(&self) -> usize {
        self.state.lock().unwrap().refreshes
    }

    pub fn invalidation_count(&self) -> usize {
        self.state.lock().unwrap().invalidations
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn resolve_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError> {
        let mut state = self.state.lock().unwrap();
        state.resolves += 1;
        if let Some(ref error) = state.fail_with {
            return Err(error.clone());
        }
        if force_refresh {
            state.refreshes += 1;
            let next = if state.refreshed.len() > 1 {
                state.refreshed.pop_front().flatten()
            } else {
                state.refreshed.front().cloned().flatten()
            };
            state.current = next;
        }
        Ok(state.current.clone())
    }

    async fn invalidate(&self) -> Result<(), TokenError> {
        let mut state = self.state.lock().unwrap();
        state.invalidations += 1;
        state.current = None;
        Ok(())
    }
}
