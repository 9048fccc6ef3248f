//! Error types shared across subsystems.
//!
//! Each failure is contained where it happens: forwarding errors become a
//! status code for one client, rotation errors become a warning, and only
//! lifecycle errors reach the host.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::net::listener::ListenerError;
use crate::upstream::DestinationError;

/// Per-request forwarding failure.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// No upstream response head within the deadline.
    #[error("upstream did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    /// DNS, connect, TLS, or protocol failure talking to the destination.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("invalid upstream target: {0}")]
    Target(#[from] DestinationError),

    #[error("internal proxy error: {0}")]
    Internal(String),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ForwardError::Target(_) | ForwardError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Timeout(_) => "timeout",
            ForwardError::Upstream(_) => "upstream",
            ForwardError::Target(_) => "target",
            ForwardError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "type": "error",
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });

        (self.status(), Json(body)).into_response()
    }
}

/// Failure of one credential command run. The previous token is kept.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("token command is empty")]
    EmptyCommand,

    #[error("failed to spawn token command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("token command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("token command exited with {}: {stderr}", describe_exit(.code))]
    Exit { code: Option<i32>, stderr: String },

    #[error("token command produced no token")]
    EmptyOutput,

    #[error("token command output is not a usable token: {0}")]
    InvalidToken(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

impl RotationError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RotationError::EmptyCommand => "empty_command",
            RotationError::Spawn(_) => "spawn",
            RotationError::Timeout(_) => "timeout",
            RotationError::Exit { .. } => "exit",
            RotationError::EmptyOutput => "empty_output",
            RotationError::InvalidToken(_) => "invalid_token",
        }
    }
}

/// Failure of a host-facing lifecycle operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("proxy is already running on port {port}")]
    AlreadyRunning { port: u16 },

    #[error("proxy is not running")]
    NotRunning,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Listener(#[from] ListenerError),

    #[error("failed to build upstream client: {0}")]
    Client(String),

    #[error("token rotation failed: {0}")]
    Rotation(#[from] RotationError),
}
