//! Host-facing proxy lifecycle.
//!
//! # Responsibilities
//! - Start: validate, build the client, fetch the first token, bind, serve,
//!   then schedule rotation
//! - Stop: cancel rotation, close the listener, drain open connections
//! - Keep at most one running instance per controller
//!
//! # Design Decisions
//! - A failed start leaves nothing behind (no listener, no rotation task)
//! - The first token fetch happens before the listener binds, so a request
//!   can never observe a token that has not been tried yet
//! - A failed first fetch is logged; the proxy starts with no token

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{validate_config, ConfigError, ProxyConfig, ValidationError};
use crate::error::LifecycleError;
use crate::http::{build_router, serve, AppState};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::token::{RotationOutcome, TokenManager};
use crate::upstream::{Destination, UpstreamClient};

/// Outcome of a successful start, suitable for showing to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub local_addr: SocketAddr,
    pub destination: String,
    pub auth_enabled: bool,
    /// Whether a token was in place when the listener opened.
    pub token_ready: bool,
}

impl fmt::Display for StartReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Proxy listening on port {}, forwarding to {}",
            self.local_addr.port(),
            self.destination
        )?;
        match (self.auth_enabled, self.token_ready) {
            (false, _) => write!(f, " without authentication"),
            (true, true) => write!(f, " with bearer token authentication"),
            (true, false) => write!(f, " (bearer token not yet available)"),
        }
    }
}

/// Outcome of a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub port: u16,
    /// False when connections were still open at the drain deadline.
    pub drained: bool,
    pub remaining_connections: u64,
}

impl fmt::Display for StopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proxy on port {} stopped", self.port)?;
        if !self.drained {
            write!(f, " ({} connections abandoned)", self.remaining_connections)?;
        }
        Ok(())
    }
}

/// Running or not; never half of either.
#[derive(Default)]
enum ServerHandle {
    #[default]
    Stopped,
    Running(RunningServer),
}

struct RunningServer {
    config: Arc<ProxyConfig>,
    local_addr: SocketAddr,
    tokens: Arc<TokenManager>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    accept_task: Option<JoinHandle<()>>,
}

impl RunningServer {
    async fn launch(config: ProxyConfig) -> Result<(Self, StartReport), LifecycleError> {
        validate_config(&config).map_err(ConfigError::from)?;
        let destination = Destination::parse(&config.destination).map_err(|e| {
            ConfigError::from(vec![ValidationError::InvalidDestination(e.to_string())])
        })?;

        let upstream = UpstreamClient::new(&config.timeouts, &config.limits)
            .map_err(|e| LifecycleError::Client(e.to_string()))?;

        let tokens = Arc::new(TokenManager::from_config(&config));
        if tokens.auth_enabled() {
            if let Err(e) = tokens.rotate().await {
                tracing::warn!(error = %e, "Starting without a bearer token");
            }
        }

        let address = config.bind_address();
        let listener = Listener::bind(&address, config.limits.max_connections).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { address, source })?;

        let report = StartReport {
            local_addr,
            destination: destination.to_string(),
            auth_enabled: tokens.auth_enabled(),
            token_ready: tokens.bearer().is_some(),
        };

        let app = build_router(AppState {
            destination: Arc::new(destination),
            tokens: Arc::clone(&tokens),
            upstream,
        });
        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let accept_task = tokio::spawn(serve(listener, app, shutdown.subscribe(), tracker.clone()));

        if tokens.auth_enabled() {
            tokens.schedule_rotation(config.rotation_interval());
        }

        let server = Self {
            config: Arc::new(config),
            local_addr,
            tokens,
            shutdown,
            tracker,
            accept_task: Some(accept_task),
        };
        Ok((server, report))
    }

    async fn shutdown(mut self) -> StopReport {
        self.tokens.stop_rotation();
        self.shutdown.trigger();

        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Accept loop ended abnormally");
            }
        }

        let drain = self.config.timeouts.drain();
        let drained = tokio::time::timeout(drain, self.tracker.wait_idle()).await.is_ok();
        let remaining_connections = self.tracker.active_count();
        if !drained {
            tracing::warn!(
                remaining = remaining_connections,
                drain_secs = drain.as_secs(),
                "Drain deadline reached with connections still open"
            );
        }

        StopReport {
            port: self.local_addr.port(),
            drained,
            remaining_connections,
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        // Covers a controller dropped without stop(); both calls are idempotent.
        self.tokens.stop_rotation();
        self.shutdown.trigger();
    }
}

/// Owns at most one proxy instance.
#[derive(Default)]
pub struct ProxyController {
    state: ServerHandle,
}

impl ProxyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ServerHandle::Running(_))
    }

    /// Address the listener is bound to, when running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            ServerHandle::Running(server) => Some(server.local_addr),
            ServerHandle::Stopped => None,
        }
    }

    /// Configuration the running instance was started with.
    pub fn config(&self) -> Option<&ProxyConfig> {
        match &self.state {
            ServerHandle::Running(server) => Some(server.config.as_ref()),
            ServerHandle::Stopped => None,
        }
    }

    /// Token manager of the running instance.
    pub fn tokens(&self) -> Option<&Arc<TokenManager>> {
        match &self.state {
            ServerHandle::Running(server) => Some(&server.tokens),
            ServerHandle::Stopped => None,
        }
    }

    /// Start the proxy with a frozen copy of `config`.
    pub async fn start(&mut self, config: ProxyConfig) -> Result<StartReport, LifecycleError> {
        if let ServerHandle::Running(server) = &self.state {
            return Err(LifecycleError::AlreadyRunning {
                port: server.local_addr.port(),
            });
        }

        tracing::info!(
            destination = %config.destination,
            bind = %config.bind_address(),
            auth = config.auth_enabled(),
            "Starting proxy"
        );

        let (server, report) = RunningServer::launch(config).await.inspect_err(|e| {
            tracing::error!(error = %e, "Proxy failed to start");
        })?;
        self.state = ServerHandle::Running(server);

        tracing::info!(
            address = %report.local_addr,
            destination = %report.destination,
            auth = report.auth_enabled,
            "{}",
            report
        );
        Ok(report)
    }

    /// Stop the running proxy and wait for open connections to drain.
    pub async fn stop(&mut self) -> Result<StopReport, LifecycleError> {
        let server = match std::mem::take(&mut self.state) {
            ServerHandle::Running(server) => server,
            ServerHandle::Stopped => return Err(LifecycleError::NotRunning),
        };

        tracing::info!(port = server.local_addr.port(), "Stopping proxy");
        let report = server.shutdown().await;
        tracing::info!(drained = report.drained, "{}", report);
        Ok(report)
    }

    /// Run the credential command now, outside the schedule.
    pub async fn rotate_token(&self) -> Result<RotationOutcome, LifecycleError> {
        match &self.state {
            ServerHandle::Running(server) => Ok(server.tokens.rotate().await?),
            ServerHandle::Stopped => Err(LifecycleError::NotRunning),
        }
    }
}
