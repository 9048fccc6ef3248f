//! Bearer token state and rotation.
//!
//! # Responsibilities
//! - Hold the current sanitized token for lock-free concurrent readers
//! - Run the credential source on demand and on a fixed cadence
//! - Keep the last good token when a rotation fails
//! - Disable authentication for good if the command turns out to be empty
//!
//! # Design Decisions
//! - Token lives in an `ArcSwap`: readers see the old or the new value, never a mix
//! - Rotations are serialized by an async mutex (single writer)
//! - The periodic task holds only a `Weak` reference to the manager
//! - `stop_rotation` flips the cancel signal before returning; scheduled runs
//!   check it under the rotation lock, so none starts a command afterwards

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ProxyConfig;
use crate::error::RotationError;
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::observability::metrics;
use crate::token::source::{parse_token, CredentialSource, ShellCommand};

/// Result of a rotation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// A new token was stored.
    Rotated,
    /// Authentication is disabled; nothing was run.
    Disabled,
}

/// Handle to the periodic rotation task.
#[derive(Debug)]
struct RotationTask {
    cancel: Shutdown,
    _handle: JoinHandle<()>,
}

/// Owns the current bearer token for one server lifetime.
#[derive(Debug)]
pub struct TokenManager {
    source: Box<dyn CredentialSource>,
    token: ArcSwap<String>,
    auth_enabled: AtomicBool,
    rotation_lock: tokio::sync::Mutex<()>,
    rotation: Mutex<Option<RotationTask>>,
}

impl TokenManager {
    /// Create a manager around a credential source. Authentication is enabled
    /// iff the source is configured.
    pub fn new(source: impl CredentialSource + 'static) -> Self {
        let auth_enabled = source.is_configured();
        Self {
            source: Box::new(source),
            token: ArcSwap::from_pointee(String::new()),
            auth_enabled: AtomicBool::new(auth_enabled),
            rotation_lock: tokio::sync::Mutex::new(()),
            rotation: Mutex::new(None),
        }
    }

    /// Create a manager running the configured shell command.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(ShellCommand::new(
            config.token_command.clone(),
            config.timeouts.command(),
        ))
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_enabled.load(Ordering::Acquire)
    }

    /// The current sanitized token, possibly empty. Never blocks.
    pub fn current_token(&self) -> Arc<String> {
        self.token.load_full()
    }

    /// The token to attach to an outbound request, if any.
    pub fn bearer(&self) -> Option<Arc<String>> {
        if !self.auth_enabled() {
            return None;
        }
        let token = self.current_token();
        (!token.is_empty()).then_some(token)
    }

    /// Run the credential source once and store the result.
    ///
    /// Failures leave the previous token in place. An empty command disables
    /// authentication for the rest of this manager's life.
    pub async fn rotate(&self) -> Result<RotationOutcome, RotationError> {
        let _guard = self.rotation_lock.lock().await;
        self.rotate_locked().await
    }

    async fn rotate_locked(&self) -> Result<RotationOutcome, RotationError> {
        if !self.auth_enabled() {
            return Ok(RotationOutcome::Disabled);
        }

        let result = match self.source.fetch().await {
            Ok(raw) => parse_token(&raw),
            Err(e) => Err(e),
        };

        match result {
            Ok(token) => {
                let length = token.len();
                self.token.store(Arc::new(token));
                metrics::record_rotation("success");
                tracing::info!(token_len = length, "Bearer token rotated");
                Ok(RotationOutcome::Rotated)
            }
            Err(e) => {
                if matches!(e, RotationError::EmptyCommand) {
                    self.auth_enabled.store(false, Ordering::Release);
                    tracing::warn!("Token command is empty, authentication disabled until restart");
                } else {
                    tracing::warn!(
                        error = %e,
                        kept_previous = !self.current_token().is_empty(),
                        "Token rotation failed"
                    );
                }
                metrics::record_rotation(e.kind());
                Err(e)
            }
        }
    }

    /// Rotate now, then every `interval`.
    pub async fn start_rotation(self: &Arc<Self>, interval: Duration) {
        // Failures are logged inside; the schedule still starts.
        let _ = self.rotate().await;
        self.schedule_rotation(interval);
    }

    /// Rotate every `interval`, first run one interval from now. Replaces any
    /// previous schedule.
    pub fn schedule_rotation(self: &Arc<Self>, interval: Duration) {
        let cancel = Shutdown::new();
        let signal = cancel.subscribe();
        let weak = Arc::downgrade(self);

        let handle = tokio::spawn(run_schedule(weak, interval, signal));

        let previous = self
            .rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(RotationTask {
                cancel,
                _handle: handle,
            });
        if let Some(previous) = previous {
            previous.cancel.trigger();
        }

        tracing::debug!(interval_secs = interval.as_secs(), "Token rotation scheduled");
    }

    /// Cancel the periodic task. Safe to call when nothing is scheduled.
    /// A rotation already running is allowed to finish.
    pub fn stop_rotation(&self) {
        let task = self
            .rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.cancel.trigger();
            tracing::debug!("Token rotation stopped");
        }
    }

    /// Whether a periodic task is scheduled.
    pub fn is_rotating(&self) -> bool {
        self.rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn rotate_scheduled(&self, signal: &ShutdownSignal) {
        let _guard = self.rotation_lock.lock().await;
        if signal.is_triggered() {
            return;
        }
        // Errors are logged and counted in rotate_locked.
        let _ = self.rotate_locked().await;
    }
}

async fn run_schedule(manager: Weak<TokenManager>, interval: Duration, mut signal: ShutdownSignal) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = signal.recv() => break,
            _ = ticker.tick() => {}
        }

        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.rotate_scheduled(&signal).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Replays scripted results; repeats the last one when exhausted.
    #[derive(Debug)]
    struct ScriptedSource {
        results: Mutex<VecDeque<Result<String, RotationError>>>,
        calls: Arc<AtomicUsize>,
        configured: bool,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<String, RotationError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                results: Mutex::new(results.into()),
                calls: calls.clone(),
                configured: true,
            };
            (source, calls)
        }

        fn counting(token: &str) -> (Self, Arc<AtomicUsize>) {
            Self::new(vec![Ok(token.to_string())])
        }
    }

    #[async_trait]
    impl CredentialSource for ScriptedSource {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn fetch(&self) -> Result<String, RotationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                results.pop_front().unwrap()
            } else {
                match results.front() {
                    Some(Ok(token)) => Ok(token.clone()),
                    _ => Err(RotationError::EmptyOutput),
                }
            }
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_rotate_sanitizes_output() {
        let (source, _) = ScriptedSource::counting("  abc123\n");
        let manager = TokenManager::new(source);

        assert_eq!(manager.rotate().await.unwrap(), RotationOutcome::Rotated);
        assert_eq!(manager.current_token().as_str(), "abc123");
        assert_eq!(manager.bearer().unwrap().as_str(), "abc123");
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_token() {
        let (source, _) = ScriptedSource::new(vec![
            Ok("T1".into()),
            Err(RotationError::Exit {
                code: Some(1),
                stderr: "expired".into(),
            }),
            Err(RotationError::Timeout(Duration::from_secs(60))),
        ]);
        let manager = TokenManager::new(source);

        manager.rotate().await.unwrap();
        assert!(manager.rotate().await.is_err());
        assert!(manager.rotate().await.is_err());

        assert!(manager.auth_enabled());
        assert_eq!(manager.bearer().unwrap().as_str(), "T1");
    }

    #[tokio::test]
    async fn test_failed_first_rotation_leaves_empty_token() {
        let (source, _) = ScriptedSource::new(vec![Err(RotationError::EmptyOutput)]);
        let manager = TokenManager::new(source);

        assert!(manager.rotate().await.is_err());
        assert!(manager.auth_enabled());
        assert!(manager.current_token().is_empty());
        assert!(manager.bearer().is_none());
    }

    #[tokio::test]
    async fn test_invalid_output_rejected() {
        let (source, _) = ScriptedSource::new(vec![Ok("good".into()), Ok("bad\u{7}".into())]);
        let manager = TokenManager::new(source);

        manager.rotate().await.unwrap();
        assert!(matches!(
            manager.rotate().await,
            Err(RotationError::InvalidToken(_))
        ));
        assert_eq!(manager.current_token().as_str(), "good");
    }

    #[tokio::test]
    async fn test_empty_command_disables_auth_permanently() {
        let (source, calls) = ScriptedSource::new(vec![
            Ok("T1".into()),
            Err(RotationError::EmptyCommand),
            Ok("T2".into()),
        ]);
        let manager = TokenManager::new(source);

        manager.rotate().await.unwrap();
        assert!(matches!(manager.rotate().await, Err(RotationError::EmptyCommand)));
        assert!(!manager.auth_enabled());
        assert!(manager.bearer().is_none());
        // Previous value is not cleared, just no longer attached.
        assert_eq!(manager.current_token().as_str(), "T1");

        assert_eq!(manager.rotate().await.unwrap(), RotationOutcome::Disabled);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!manager.auth_enabled());
    }

    #[tokio::test]
    async fn test_unconfigured_source_never_runs() {
        let (mut source, calls) = ScriptedSource::counting("T1");
        source.configured = false;
        let manager = TokenManager::new(source);

        assert!(!manager.auth_enabled());
        assert_eq!(manager.rotate().await.unwrap(), RotationOutcome::Disabled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(manager.bearer().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rotation_runs_immediately_then_on_interval() {
        let (source, calls) = ScriptedSource::counting("T1");
        let manager = Arc::new(TokenManager::new(source));
        let interval = Duration::from_secs(60);

        manager.start_rotation(interval).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.is_rotating());

        tokio::time::advance(Duration::from_secs(59)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(interval).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        manager.stop_rotation();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_rotation_prevents_future_runs() {
        let (source, calls) = ScriptedSource::counting("T1");
        let manager = Arc::new(TokenManager::new(source));
        let interval = Duration::from_secs(60);

        manager.schedule_rotation(interval);
        tokio::time::advance(interval).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        manager.stop_rotation();
        assert!(!manager.is_rotating());

        tokio::time::advance(interval * 5).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_rotation_when_never_started() {
        let (source, _) = ScriptedSource::counting("T1");
        let manager = TokenManager::new(source);
        manager.stop_rotation();
        manager.stop_rotation();
        assert!(!manager.is_rotating());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_ends_when_manager_dropped() {
        let (source, calls) = ScriptedSource::counting("T1");
        let manager = Arc::new(TokenManager::new(source));
        manager.schedule_rotation(Duration::from_secs(60));
        drop(manager);

        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
