//! Sync service facade.
//!
//! [`SyncService`] wires one [`AuthenticatedExecutor`], its request cache and
//! one [`SubscriptionScheduler`] from a single [`SyncConfig`]. Applications
//! hold one service and pass clones around.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::{RequestError, SchedulerError};
use crate::executor::AuthenticatedExecutor;
use crate::request::RequestOptions;
use crate::sync::{
    ChannelUpdate, LiveChannel, LiveOptions, SubscribeOptions, SubscriptionId,
    SubscriptionScheduler,
};
use crate::traits::{HttpClient, TokenProvider};

pub struct SyncService<H, P> {
    executor: AuthenticatedExecutor<H, P>,
    scheduler: SubscriptionScheduler,
}

impl<H, P> Clone for SyncService<H, P> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<H, P> SyncService<H, P>
where
    H: HttpClient + 'static,
    P: TokenProvider + 'static,
{
    pub fn new(http: H, tokens: P, config: SyncConfig) -> Self {
        let scheduler = SubscriptionScheduler::new(config.clone());
        Self {
            executor: AuthenticatedExecutor::new(http, tokens, config),
            scheduler,
        }
    }

    pub fn executor(&self) -> &AuthenticatedExecutor<H, P> {
        &self.executor
    }

    pub fn scheduler(&self) -> &SubscriptionScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &SyncConfig {
        self.executor.config()
    }

    pub async fn execute(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Value, RequestError> {
        self.executor.execute(endpoint, options).await
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value, RequestError> {
        self.execute(endpoint, RequestOptions::get()).await
    }

    /// GET and cache the response for `ttl`.
    pub async fn get_cached(&self, endpoint: &str, ttl: Duration) -> Result<Value, RequestError> {
        self.execute(endpoint, RequestOptions::get().with_cache_ttl(ttl))
            .await
    }

    pub async fn post<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<Value, RequestError> {
        let options = RequestOptions::post_json(body).map_err(|e| RequestError::Internal {
            message: format!("Failed to serialize request body: {}", e),
        })?;
        self.execute(endpoint, options).await
    }

    /// Subscribe an arbitrary fetch closure on `channel`.
    pub fn subscribe<F, Fut, U>(
        &self,
        channel: &str,
        fetch: F,
        update: U,
        interval: Option<Duration>,
    ) -> Result<SubscriptionId, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RequestError>> + Send + 'static,
        U: Fn(&Value, &[String]) + Send + Sync + 'static,
    {
        self.scheduler.subscribe(channel, fetch, update, interval)
    }

    /// Poll a GET endpoint through the executor.
    pub fn subscribe_endpoint<U>(
        &self,
        channel: &str,
        endpoint: &str,
        update: U,
        interval: Option<Duration>,
    ) -> Result<SubscriptionId, SchedulerError>
    where
        U: Fn(&Value, &[String]) + Send + Sync + 'static,
    {
        self.scheduler
            .subscribe(channel, self.endpoint_fetch(endpoint), update, interval)
    }

    /// Poll a GET endpoint and receive updates on a channel.
    pub fn watch_endpoint(
        &self,
        channel: &str,
        endpoint: &str,
        options: SubscribeOptions,
    ) -> Result<
        (
            SubscriptionId,
            tokio::sync::mpsc::UnboundedReceiver<ChannelUpdate>,
        ),
        SchedulerError,
    > {
        self.scheduler
            .subscribe_stream(channel, options, self.endpoint_fetch(endpoint))
    }

    /// Open a [`LiveChannel`] over a GET endpoint.
    pub fn live(&self, endpoint: &str, options: LiveOptions) -> Result<LiveChannel, SchedulerError> {
        LiveChannel::open(&self.scheduler, options, self.endpoint_fetch(endpoint))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.scheduler.unsubscribe(id)
    }

    pub async fn refresh(&self, channel: &str) {
        self.scheduler.refresh(channel).await
    }

    pub fn disconnect(&self) {
        self.scheduler.disconnect()
    }

    pub fn clear_cache(&self) {
        self.executor.cache().clear_all()
    }

    /// Clear cached responses and drop the mirrored token.
    pub async fn sign_out(&self) -> Result<(), RequestError> {
        self.clear_cache();
        self.executor.token_provider().invalidate().await?;
        info!("Signed out");
        Ok(())
    }

    /// Stop every subscription, reject new ones and clear the cache.
    pub fn dispose(&self) {
        self.scheduler.dispose();
        self.clear_cache();
    }

    fn endpoint_fetch(
        &self,
        endpoint: &str,
    ) -> impl Fn() -> BoxFuture<'static, Result<Value, RequestError>> + Send + Sync + 'static {
        let executor = self.executor.clone();
        let endpoint = endpoint.to_string();
        move || {
            let executor = executor.clone();
            let endpoint = endpoint.clone();
            async move {
                let result = executor.execute(&endpoint, RequestOptions::get()).await;
                if let Err(ref e) = result {
                    warn!(endpoint = %endpoint, error = %e, "Poll request failed");
                }
                result
            }
            .boxed()
        }
    }
}
