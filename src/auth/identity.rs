//! Identity provider implementations.
//!
//! [`StaticIdentity`] hands out a fixed token (service accounts, the CLI's
//! `PORTAL_TOKEN`). [`RefreshTokenIdentity`] exchanges a refresh token for
//! access tokens against the identity service's `/auth/refresh` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::traits::{IdentityProvider, TokenError};

/// Identity provider returning the same token on every call.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    token: Option<String>,
}

impl StaticIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// An identity with no signed-in user.
    pub fn signed_out() -> Self {
        Self { token: None }
    }

    pub fn is_signed_out(&self) -> bool {
        self.token.is_none()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn id_token(&self, _force_refresh: bool) -> Result<Option<String>, TokenError> {
        Ok(self.token.clone())
    }
}

/// Response from the refresh endpoint (POST /auth/refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u32>,
}

#[derive(Debug, Default)]
struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Identity provider backed by an OAuth-style refresh token.
///
/// The latest access token is kept in memory; a forced call (or a call with no
/// access token yet) POSTs `{"refresh_token": ...}` to `{auth_url}/auth/refresh`.
/// A rotated refresh token in the response replaces the old one. A 400/401/403
/// from the refresh endpoint means the session is over and yields `Ok(None)`.
///
/// Exchanges are single-flight: a caller that waited on another exchange
/// reuses its access token instead of spending the refresh token again.
pub struct RefreshTokenIdentity {
    auth_url: String,
    client: Client,
    session: Mutex<Session>,
    exchange: tokio::sync::Mutex<()>,
}

impl RefreshTokenIdentity {
    pub fn new(auth_url: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            session: Mutex::new(Session {
                access_token: None,
                refresh_token: Some(refresh_token.into()),
            }),
            exchange: tokio::sync::Mutex::new(()),
        }
    }

    /// Use a preconfigured reqwest client (timeouts, proxies).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// The refresh token currently held, after any rotation.
    pub fn refresh_token(&self) -> Option<String> {
        self.session().refresh_token.clone()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Option<RefreshResponse>, TokenError> {
        let url = format!("{}/auth/refresh", self.auth_url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| TokenError::Provider(e.to_string()))?;

        let status = response.status().as_u16();
        if matches!(status, 400 | 401 | 403) {
            info!(status, "Refresh token rejected, session ended");
            return Ok(None);
        }
        if !response.status().is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TokenError::Provider(format!(
                "refresh failed ({}): {}",
                status, message
            )));
        }

        let data: RefreshResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Serialization(e.to_string()))?;
        Ok(Some(data))
    }
}

#[async_trait]
impl IdentityProvider for RefreshTokenIdentity {
    async fn id_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError> {
        let seen = {
            let session = self.session();
            match (&session.access_token, force_refresh) {
                (Some(token), false) => return Ok(Some(token.clone())),
                (token, _) => token.clone(),
            }
        };

        let _exchange = self.exchange.lock().await;

        let refresh_token = {
            let session = self.session();
            // Another caller finished an exchange while we waited.
            if let Some(ref token) = session.access_token {
                if session.access_token != seen || !force_refresh {
                    return Ok(Some(token.clone()));
                }
            }
            match session.refresh_token.clone() {
                Some(token) => token,
                None => return Ok(None),
            }
        };

        debug!(force_refresh, "Exchanging refresh token");
        let refreshed = self.refresh(&refresh_token).await?;

        let mut session = self.session();
        match refreshed {
            Some(data) => {
                session.access_token = Some(data.access_token.clone());
                if let Some(rotated) = data.refresh_token {
                    session.refresh_token = Some(rotated);
                }
                Ok(Some(data.access_token))
            }
            None => {
                *session = Session::default();
                Ok(None)
            }
        }
    }
}
