//! Token subsystem.
//!
//! # Data Flow
//! ```text
//! start():  TokenManager::rotate()  (before the listener binds)
//!           TokenManager::schedule_rotation(interval)
//!
//! every interval / on demand:
//!     source.rs (ShellCommand: sh -c <command>, bounded by a timeout)
//!     → parse_token (strip whitespace, check header-safe)
//!     → manager.rs (ArcSwap store, or keep previous on failure)
//!
//! every request:
//!     TokenManager::bearer() → Option<token> snapshot
//! ```

pub mod manager;
pub mod source;

pub use manager::{RotationOutcome, TokenManager};
pub use source::{parse_token, sanitize_token, CredentialSource, ShellCommand};
