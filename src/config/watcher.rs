//! Configuration file watcher.
//!
//! A running server never sees config edits; the watcher hands freshly loaded
//! snapshots to the host, which restarts the proxy to apply them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::read_config;
use crate::config::schema::ProxyConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
    overrides: Box<dyn Fn(&mut ProxyConfig) + Send + Sync>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
                overrides: Box::new(|_| {}),
            },
            update_rx,
        )
    }

    /// Apply `f` to every reloaded snapshot (CLI flags win over the file).
    pub fn with_overrides(mut self, f: impl Fn(&mut ProxyConfig) + Send + Sync + 'static) -> Self {
        self.overrides = Box::new(f);
        self
    }

    /// Start watching the file. The returned watcher must be kept alive.
    ///
    /// Snapshots are forwarded unvalidated; `start` rejects bad ones with a
    /// configuration error the host can report.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            update_tx,
            overrides,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = %watched.display(), "Config file change detected");
                        match read_config(&watched) {
                            Ok(mut config) => {
                                overrides(&mut config);
                                let _ = update_tx.send(config);
                            }
                            Err(e) => {
                                tracing::error!(
                                    error = %e,
                                    "Failed to reload config, keeping current proxy"
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}
