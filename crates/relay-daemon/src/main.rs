//! # relay-daemon
//!
//! `relayd`: loads configuration, starts the relay server, and waits for a
//! shutdown signal.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::logging::{self, LogFormat};
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;
use relay_settings::RelaySettings;

/// Real-time chat relay.
#[derive(Parser, Debug)]
#[command(name = "relayd", about = "WebSocket chat relay", version)]
struct Cli {
    /// Host to bind (overrides settings and environment).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings and environment).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `relay_server=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(relay_settings::settings_path)
    }

    /// Apply flag overrides on top of loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.format = LogFormat::Json;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // .env values land in the process environment before settings read it
    let dotenv = dotenvy::dotenv().ok();

    let settings_path = args.settings_path();
    let mut settings = relay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    logging::init_subscriber(&settings.logging.level, settings.logging.format);
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let metrics_handle =
        relay_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings.server);
    let drain_timeout = config.shutdown_timeout();
    let server = RelayServer::new(config, metrics_handle);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("relay listening on http://{addr} (ws://{addr}/ws)");

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    let clean = server
        .shutdown()
        .graceful_shutdown(vec![handle], drain_timeout)
        .await;
    tracing::info!(clean, participants = server.directory().len(), "Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}
