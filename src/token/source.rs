//! Credential sources.
//!
//! A source produces raw command output; the [`TokenManager`] sanitizes and
//! stores it. Production uses [`ShellCommand`]; tests plug in scripted sources.
//!
//! [`TokenManager`]: crate::token::TokenManager

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderValue;
use tokio::process::Command;

use crate::error::RotationError;

/// Longest stderr excerpt kept in a rotation error.
const STDERR_EXCERPT: usize = 256;

/// Something that can produce a fresh bearer token.
#[async_trait]
pub trait CredentialSource: Send + Sync + std::fmt::Debug {
    /// Whether a credential command is configured at all.
    fn is_configured(&self) -> bool;

    /// Run once and return the raw, unsanitized output.
    async fn fetch(&self) -> Result<String, RotationError>;
}

/// Runs a shell command and reads the token from its stdout.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    command: String,
    timeout: Duration,
}

impl ShellCommand {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    #[cfg(unix)]
    fn build(&self) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(self.command.trim());
        cmd
    }

    #[cfg(windows)]
    fn build(&self) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(self.command.trim());
        cmd
    }
}

#[async_trait]
impl CredentialSource for ShellCommand {
    fn is_configured(&self) -> bool {
        !self.command.trim().is_empty()
    }

    async fn fetch(&self) -> Result<String, RotationError> {
        if !self.is_configured() {
            return Err(RotationError::EmptyCommand);
        }

        let child = self
            .build()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(RotationError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RotationError::Exit {
                code: output.status.code(),
                stderr: stderr.trim().chars().take(STDERR_EXCERPT).collect(),
            });
        }

        String::from_utf8(output.stdout)
            .map_err(|_| RotationError::InvalidToken("output is not valid UTF-8".into()))
    }
}

/// Strip every whitespace character (including interior newlines).
pub fn sanitize_token(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Sanitize raw output into a token that can be sent as `Bearer <token>`.
pub fn parse_token(raw: &str) -> Result<String, RotationError> {
    let token = sanitize_token(raw);
    if token.is_empty() {
        return Err(RotationError::EmptyOutput);
    }
    if HeaderValue::from_str(&token).is_err() {
        return Err(RotationError::InvalidToken(
            "contains characters not allowed in a header".into(),
        ));
    }
    Ok(token)
}
