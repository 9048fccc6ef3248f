//! token-relay host binary.
//!
//! Starts one proxy from a TOML file and/or flags, then:
//! - SIGINT / SIGTERM: stop and exit
//! - SIGHUP: run the credential command now
//! - `--watch`: restart the proxy when the config file changes

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc::UnboundedReceiver;

use token_relay::config::watcher::ConfigWatcher;
use token_relay::config::{read_config, LogFormat, ProxyConfig};
use token_relay::lifecycle::{HostSignal, Signals};
use token_relay::observability::{logging, metrics};
use token_relay::ProxyController;

#[derive(Debug, Parser)]
#[command(
    name = "token-relay",
    version,
    about = "Forward local HTTP requests to one destination with a rotating bearer token"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL every request is forwarded to.
    #[arg(short, long)]
    destination: Option<String>,

    /// Shell command whose stdout is the bearer token.
    #[arg(short, long)]
    token_command: Option<String>,

    /// Local listening port.
    #[arg(short, long)]
    port: Option<u32>,

    /// Minutes between credential command runs.
    #[arg(long)]
    rotation_minutes: Option<u64>,

    /// Local listening host.
    #[arg(long)]
    bind_host: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Restart the proxy when the config file changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

/// Flag values that win over the config file, re-applied on every reload.
#[derive(Debug, Clone, Default)]
struct Overrides {
    destination: Option<String>,
    token_command: Option<String>,
    port: Option<u32>,
    rotation_minutes: Option<u64>,
    bind_host: Option<String>,
    log_format: Option<LogFormat>,
}

impl Overrides {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(destination) = &self.destination {
            config.destination = destination.clone();
        }
        if let Some(command) = &self.token_command {
            config.token_command = command.clone();
        }
        if let Some(port) = self.port {
            config.proxy_port = port;
        }
        if let Some(minutes) = self.rotation_minutes {
            config.token_rotation_minutes = minutes;
        }
        if let Some(host) = &self.bind_host {
            config.bind_host = host.clone();
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}

impl From<&Cli> for Overrides {
    fn from(cli: &Cli) -> Self {
        Self {
            destination: cli.destination.clone(),
            token_command: cli.token_command.clone(),
            port: cli.port,
            rotation_minutes: cli.rotation_minutes,
            bind_host: cli.bind_host.clone(),
            log_format: cli.log_format.map(|format| match format {
                LogFormatArg::Pretty => LogFormat::Pretty,
                LogFormatArg::Json => LogFormat::Json,
            }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let overrides = Overrides::from(&cli);

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    overrides.apply(&mut config);

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "token-relay starting");

    if let Some(address) = &config.observability.metrics_address {
        match address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %address,
                error = %e,
                "Invalid metrics address"
            ),
        }
    }

    let mut signals = Signals::install()?;
    let mut controller = ProxyController::new();
    controller.start(config).await?;

    let (_watcher, mut updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let reapply = overrides.clone();
            let (watcher, rx) = ConfigWatcher::new(path);
            let watcher = watcher.with_overrides(move |config| reapply.apply(config)).run()?;
            (Some(watcher), Some(rx))
        }
        _ => (None, None),
    };

    loop {
        tokio::select! {
            signal = signals.next() => match signal {
                HostSignal::Shutdown => break,
                HostSignal::RotateToken => match controller.rotate_token().await {
                    Ok(outcome) => {
                        tracing::info!(outcome = ?outcome, "On-demand rotation finished")
                    }
                    Err(e) => tracing::warn!(error = %e, "On-demand rotation failed"),
                },
            },
            Some(next) = next_update(&mut updates) => restart(&mut controller, next).await,
        }
    }

    if controller.is_running() {
        controller.stop().await?;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn next_update(updates: &mut Option<UnboundedReceiver<ProxyConfig>>) -> Option<ProxyConfig> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Apply a reloaded config by stopping and starting the proxy.
///
/// A rejected config leaves the proxy stopped until the file is fixed.
async fn restart(controller: &mut ProxyController, next: ProxyConfig) {
    if controller.config() == Some(&next) {
        tracing::debug!("Config unchanged, not restarting");
        return;
    }

    if controller.is_running() {
        if let Err(e) = controller.stop().await {
            tracing::warn!(error = %e, "Stop before restart failed");
        }
    }
    if let Err(e) = controller.start(next).await {
        tracing::error!(error = %e, "Restart with reloaded config failed; proxy is stopped");
    }
}
