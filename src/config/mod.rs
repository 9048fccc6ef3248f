//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, frozen for one server lifetime)
//!     → shared via Arc with the request pipeline
//!
//! On file change (host binary, --watch):
//!     watcher.rs detects change
//!     → loader.rs reads the new snapshot
//!     → host stops the running proxy and starts it with the new snapshot
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a server starts; changes apply on next start
//! - All fields have defaults except the destination
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::{LimitConfig, LogFormat, ObservabilityConfig, ProxyConfig, TimeoutConfig};
pub use validation::{validate_config, ValidationError};
