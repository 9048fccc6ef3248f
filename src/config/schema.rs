//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.
//! The host-facing keys also accept their camelCase spellings
//! (`tokenCommand`, `proxyPort`, `tokenRotationMinutes`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default inbound port.
pub const DEFAULT_PROXY_PORT: u32 = 12345;

/// Default rotation cadence in minutes.
pub const DEFAULT_ROTATION_MINUTES: u64 = 60;

/// Hard ceiling for the credential command deadline.
pub const MAX_COMMAND_SECS: u64 = 60;

/// Root configuration for the relay.
///
/// A snapshot of this struct is frozen for the lifetime of a running server;
/// edits only take effect on the next start.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Absolute upstream URL every request is forwarded to.
    pub destination: String,

    /// Shell command that prints a bearer token. Blank disables authentication.
    #[serde(alias = "tokenCommand")]
    pub token_command: String,

    /// Inbound listen port (1-65535). Wider than `u16` so out-of-range values
    /// surface as validation errors instead of parse errors.
    #[serde(alias = "proxyPort")]
    pub proxy_port: u32,

    /// Token rotation cadence in minutes.
    #[serde(alias = "tokenRotationMinutes")]
    pub token_rotation_minutes: u64,

    /// Interface the listener binds to.
    pub bind_host: String,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Connection limits.
    pub limits: LimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            destination: String::new(),
            token_command: String::new(),
            proxy_port: DEFAULT_PROXY_PORT,
            token_rotation_minutes: DEFAULT_ROTATION_MINUTES,
            bind_host: "127.0.0.1".to_string(),
            timeouts: TimeoutConfig::default(),
            limits: LimitConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Convenience constructor used by hosts and tests.
    pub fn new(destination: impl Into<String>, proxy_port: u16) -> Self {
        Self {
            destination: destination.into(),
            proxy_port: u32::from(proxy_port),
            ..Default::default()
        }
    }

    /// Builder-style setter for the token command.
    pub fn with_token_command(mut self, command: impl Into<String>) -> Self {
        self.token_command = command.into();
        self
    }

    /// Whether this snapshot enables bearer authentication.
    pub fn auth_enabled(&self) -> bool {
        !self.token_command.trim().is_empty()
    }

    /// Rotation cadence as a [`Duration`].
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.token_rotation_minutes.saturating_mul(60))
    }

    /// Address string for the inbound listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.proxy_port)
    }
}

/// Timeout configuration for the proxy and its credential command.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for the upstream response head, in seconds. Expiry yields 504.
    /// Also the longest gap allowed between response body chunks.
    pub upstream_secs: u64,

    /// Deadline for one run of the credential command, in seconds.
    pub command_secs: u64,

    /// How long `stop` waits for in-flight connections, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_secs: 30,
            command_secs: MAX_COMMAND_SECS,
            drain_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn upstream(&self) -> Duration {
        Duration::from_secs(self.upstream_secs)
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs.min(MAX_COMMAND_SECS))
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

/// Connection limits (backpressure).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum concurrent inbound connections.
    pub max_connections: usize,

    /// Maximum concurrent outbound requests to the destination.
    pub max_upstream_connections: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_upstream_connections: 50,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Prometheus endpoint bind address; metrics export is off when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_address: None,
        }
    }
}
