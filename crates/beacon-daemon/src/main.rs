//! # beacond
//!
//! Standalone push server: loads settings, starts logging and metrics, serves
//! `/push` until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use beacon_core::LogFormat;
use beacon_server::{PushServer, ServerConfig};
use beacon_settings::{BeaconSettings, PushBackend};
use clap::Parser;

/// Time allowed for connections and tasks to wind down on exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Beacon push server.
#[derive(Parser, Debug)]
#[command(name = "beacond", about = "Push events to client sessions over WebSocket or SSE")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.beacon/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Push transport: `websocket` or `sse`.
    #[arg(long)]
    backend: Option<PushBackend>,

    /// Log filter, e.g. `info` or `beacon_server=debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Log output: `compact` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Route `POST /push/events` for out-of-process producers.
    #[arg(long)]
    publish_api: bool,
}

impl Cli {
    /// Settings from file and environment, with command-line flags on top.
    fn resolve_settings(&self) -> Result<BeaconSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(beacon_settings::settings_path);
        let mut settings = beacon_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(backend) = self.backend {
            settings.push.backend = backend;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        if self.publish_api {
            settings.server.enable_publish_api = true;
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    beacon_core::init_subscriber(&settings.logging.level, settings.logging.format);
    tracing::info!(version = %settings.version, name = %settings.name, "starting beacond");

    let metrics = beacon_server::metrics::install_recorder().context("Failed to install metrics")?;
    let server = PushServer::new(ServerConfig::from(&settings)).with_metrics(metrics);
    let running = server.listen().await.context("Failed to start push server")?;
    tracing::info!(addr = %running.local_addr(), "ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    running.shutdown(SHUTDOWN_TIMEOUT).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_optional() {
        let cli = Cli::parse_from(["beacond"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.publish_api);
    }

    #[test]
    fn parses_every_flag() {
        let cli = Cli::parse_from([
            "beacond",
            "--host",
            "127.0.0.1",
            "--port",
            "7001",
            "--backend",
            "sse",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--publish-api",
        ]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(7001));
        assert_eq!(cli.backend, Some(PushBackend::Sse));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(cli.publish_api);
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["beacond", "--backend", "carrier-pigeon"]).is_err());
    }

    #[test]
    fn flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 6000}, "push": {"backend": "sse"}}"#,
        )
        .unwrap();

        let file_only = Cli::parse_from(["beacond", "--config", path.to_str().unwrap()]);
        let settings = file_only.resolve_settings().unwrap();
        assert_eq!(settings.push.backend, PushBackend::Sse);

        let overridden = Cli::parse_from([
            "beacond",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "6100",
            "--backend",
            "websocket",
        ]);
        let settings = overridden.resolve_settings().unwrap();
        assert_eq!(settings.server.port, 6100);
        assert_eq!(settings.push.backend, PushBackend::WebSocket);
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "beacond",
            "--config",
            dir.path().join("absent.json").to_str().unwrap(),
        ]);
        let settings = cli.resolve_settings().unwrap();
        assert_eq!(settings.push.ping_interval_ms, 60_000);
    }

    #[test]
    fn invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let cli = Cli::parse_from(["beacond", "--config", path.to_str().unwrap()]);
        assert!(cli.resolve_settings().is_err());
    }
}
