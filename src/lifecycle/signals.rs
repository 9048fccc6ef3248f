//! OS signal handling for the host binary.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to host events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP runs the credential command now instead of reloading config;
//!   config reload is driven by the file watcher
//! - On non-unix platforms only Ctrl+C is observed

/// What the host should do in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// SIGINT or SIGTERM.
    Shutdown,
    /// SIGHUP.
    RotateToken,
}

/// Installed signal streams.
#[derive(Debug)]
pub struct Signals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl Signals {
    /// Register handlers. Must be called from within a Tokio runtime.
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next signal of interest.
    #[cfg(unix)]
    pub async fn next(&mut self) -> HostSignal {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => HostSignal::Shutdown,
            _ = self.terminate.recv() => HostSignal::Shutdown,
            _ = self.hangup.recv() => HostSignal::RotateToken,
        };
        tracing::info!(signal = ?event, "Signal received");
        event
    }

    #[cfg(not(unix))]
    pub async fn next(&mut self) -> HostSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
        }
        tracing::info!(signal = ?HostSignal::Shutdown, "Signal received");
        HostSignal::Shutdown
    }
}
