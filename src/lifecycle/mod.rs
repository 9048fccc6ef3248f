//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! start (controller.rs):
//!     Validate config → Build client → First token → Bind → Serve → Schedule rotation
//!
//! stop (controller.rs + shutdown.rs):
//!     Cancel rotation → Trigger shutdown → Stop accepting → Drain connections
//!
//! Signals (signals.rs, host binary only):
//!     SIGTERM/SIGINT → stop
//!     SIGHUP → rotate token now
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing is bound until the config is known good
//! - Ordered shutdown: stop accept, drain, close
//! - Drain has a deadline; connections still open after it are abandoned

pub mod controller;
pub mod shutdown;
pub mod signals;

pub use controller::{ProxyController, StartReport, StopReport};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{HostSignal, Signals};
