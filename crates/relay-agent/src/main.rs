//! # relay-agent
//!
//! Connects to a relay endpoint, subscribes to the requested channels, and
//! prints every application event to stdout as one JSON object per line.
//! Logs go to stderr. Ctrl-C closes the connection cleanly.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use relay_client::{ClientConfig, ConnectionState, Environment, RealtimeClient, TokenStore, spawn_auth_watch};
use relay_core::logging::{LogFormat, init_subscriber};
use relay_settings::RelaySettings;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Relay command-line client.
#[derive(Parser, Debug)]
#[command(name = "relay-agent", about = "Subscribe to relay channels and print events")]
struct Cli {
    /// Explicit endpoint URL (skips environment detection).
    #[arg(long)]
    url: Option<String>,

    /// Origin the client is hosted on, e.g. `https://app.example.com`.
    #[arg(long)]
    origin: Option<String>,

    /// Access token (falls back to `RELAY_TOKEN`).
    #[arg(long)]
    token: Option<String>,

    /// Channel to subscribe to; repeat for several.
    #[arg(long = "channel", short = 'c')]
    channels: Vec<String>,

    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("RELAY_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }

    fn log_format(&self, settings: &RelaySettings) -> LogFormat {
        if self.json_logs {
            LogFormat::Json
        } else {
            settings.logging.format
        }
    }

    fn client_config(&self, settings: &RelaySettings) -> Result<ClientConfig> {
        let environment = match self.origin.as_deref() {
            Some(origin) => Environment::from_origin(origin).context("Invalid --origin")?,
            None => Environment::local(),
        };
        let config = ClientConfig::from_settings(settings, environment);
        Ok(match &self.url {
            Some(url) => config.with_url(url.clone()),
            None => config,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(relay_settings::settings_path);
    let settings = relay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let level = args.log_level.as_deref().unwrap_or(&settings.logging.level);
    init_subscriber(level, args.log_format(&settings));

    let Some(token) = args.token() else {
        bail!("no access token: pass --token or set RELAY_TOKEN");
    };
    let config = args.client_config(&settings)?;
    let client = RealtimeClient::with_websocket(config, Arc::new(TokenStore::with_token(token)));

    let _printer = client.on("*", |frame| {
        println!("{}", serde_json::to_string(frame)?);
        Ok(())
    });

    let mut status = client.watch_status();
    let status_task = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            tracing::info!(
                state = %current.state,
                connection_id = current.connection_id.as_deref().unwrap_or_default(),
                reconnect_attempts = current.reconnect_attempts,
                "connection status"
            );
        }
    });

    for channel in &args.channels {
        client.subscribe(channel);
    }
    client.connect().await;

    // Reconnects after the attempt budget runs out are driven by the watcher
    let cancel = CancellationToken::new();
    let watcher = spawn_auth_watch(
        client.clone(),
        Duration::from_millis(settings.auth.watch_interval_ms),
        cancel.clone(),
    );

    tracing::info!(
        channels = args.channels.len(),
        "relay agent running, Ctrl-C to stop"
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    cancel.cancel();
    let _ = watcher.await;
    client.disconnect();

    let mut closed = client.watch_status();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while closed.borrow_and_update().state != ConnectionState::Disconnected {
            if closed.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("close not confirmed within grace period");
    }
    status_task.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
