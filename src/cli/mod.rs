//! CLI module for portal-sync.
//!
//! This module provides the command-line front end:
//! - Argument parsing
//! - Version display
//! - `get` for one authenticated request
//! - `watch` for polling an endpoint until Ctrl-C
//!
//! # Usage
//!
//! ```ignore
//! use portal_sync::cli::{parse_args, run_cli_command};
//!
//! let command = parse_args(std::env::args());
//! run_cli_command(command).await?;
//! ```

pub mod args;
pub mod version;

pub use args::{parse_args, CliCommand, USAGE};
pub use version::{handle_version_command, VERSION};

use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::adapters::{FileTokenStore, ReqwestHttpClient};
use crate::auth::{MirroredTokenProvider, RefreshTokenIdentity, StaticIdentity};
use crate::config::SyncConfig;
use crate::service::SyncService;
use crate::sync::{ChannelUpdate, SubscribeOptions};
use crate::traits::{IdentityProvider, TokenError, TokenProvider};

/// Fixed bearer token for the CLI.
pub const ENV_TOKEN: &str = "PORTAL_TOKEN";
/// Refresh token exchanged against the identity service.
pub const ENV_REFRESH_TOKEN: &str = "PORTAL_REFRESH_TOKEN";
/// Identity service base URL; defaults to the API base.
pub const ENV_AUTH_URL: &str = "PORTAL_AUTH_URL";

const DEFAULT_LOG_FILTER: &str = "portal_sync=info";

type CliService = SyncService<ReqwestHttpClient, MirroredTokenProvider<FileTokenStore, CliIdentity>>;

/// Identity source selected from the environment.
pub enum CliIdentity {
    Static(StaticIdentity),
    Refresh(RefreshTokenIdentity),
}

impl CliIdentity {
    /// `PORTAL_TOKEN` wins over `PORTAL_REFRESH_TOKEN`. With neither set only
    /// the mirrored token file is used.
    pub fn from_lookup<F>(config: &SyncConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(ENV_TOKEN) {
            return CliIdentity::Static(StaticIdentity::new(token.trim()));
        }
        if let Some(refresh) = non_empty(ENV_REFRESH_TOKEN) {
            let auth_url = non_empty(ENV_AUTH_URL).unwrap_or_else(|| config.api_base_url.clone());
            return CliIdentity::Refresh(RefreshTokenIdentity::new(auth_url, refresh.trim()));
        }
        CliIdentity::Static(StaticIdentity::signed_out())
    }

    fn is_explicit(&self) -> bool {
        !matches!(self, CliIdentity::Static(s) if s.is_signed_out())
    }
}

#[async_trait]
impl IdentityProvider for CliIdentity {
    async fn id_token(&self, force_refresh: bool) -> Result<Option<String>, TokenError> {
        match self {
            CliIdentity::Static(identity) => identity.id_token(force_refresh).await,
            CliIdentity::Refresh(identity) => identity.id_token(force_refresh).await,
        }
    }
}

/// Install the tracing subscriber on stderr.
///
/// `RUST_LOG` overrides the default `portal_sync=info` filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter);

    // Already initialized in tests
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

/// Run a parsed CLI command.
pub async fn run_cli_command(command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Version => handle_version_command(),
        CliCommand::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        CliCommand::Invalid(reason) => Err(eyre!("{}\n\n{}", reason, USAGE)),
        CliCommand::Get { endpoint } => {
            let service = build_service(SyncConfig::from_env()).await?;
            handle_get(&service, &endpoint).await
        }
        CliCommand::Watch {
            endpoint,
            interval,
            channel,
        } => {
            let service = build_service(SyncConfig::from_env()).await?;
            handle_watch(&service, &endpoint, &channel, interval).await
        }
    }
}

async fn build_service(config: SyncConfig) -> Result<CliService> {
    let identity = CliIdentity::from_lookup(&config, |name| std::env::var(name).ok());
    let explicit = identity.is_explicit();
    let tokens = MirroredTokenProvider::new(FileTokenStore::new()?, identity);

    // An explicit token replaces whatever the mirror holds.
    if explicit {
        tokens.invalidate().await?;
    }

    info!(api_base = %config.api_base_url, "Using API");
    Ok(SyncService::new(ReqwestHttpClient::new(), tokens, config))
}

async fn handle_get(service: &CliService, endpoint: &str) -> Result<()> {
    match service.get(endpoint).await {
        Ok(data) => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        Err(e) => Err(eyre!("{} ({})", e.user_message(), e)),
    }
}

async fn handle_watch(
    service: &CliService,
    endpoint: &str,
    channel: &str,
    interval: Option<Duration>,
) -> Result<()> {
    let options = SubscribeOptions {
        interval,
        ..SubscribeOptions::default()
    };
    let (id, mut updates) = service.watch_endpoint(channel, endpoint, options)?;
    eprintln!("Watching {} (Ctrl-C to stop)", endpoint);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) => print_update(&update)?,
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Unable to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    service.unsubscribe(id);
    service.dispose();
    Ok(())
}

fn print_update(update: &ChannelUpdate) -> Result<()> {
    let stamp = chrono::Local::now().format("%H:%M:%S");
    if update.changed_fields.is_empty() {
        println!("[{}] snapshot", stamp);
    } else {
        println!("[{}] changed: {}", stamp, update.changed_fields.join(", "));
    }
    println!("{}", serde_json::to_string_pretty(&update.data)?);
    Ok(())
}
