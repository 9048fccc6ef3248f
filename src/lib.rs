//! Single-destination HTTP forward proxy with a rotating bearer token.
//!
//! ```text
//! client ─▶ net::listener ─▶ http::server ─▶ http::forward ─▶ upstream::client ─▶ destination
//!                                                  │
//!                                  token::manager ─┘ (bearer snapshot)
//!                                        ▲
//!                             credential command, every N minutes
//! ```
//!
//! A host embeds [`ProxyController`] and drives `start` / `stop` /
//! `rotate_token`; the `token-relay` binary is one such host.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod token;
pub mod upstream;

pub use config::ProxyConfig;
pub use error::{ForwardError, LifecycleError, RotationError};
pub use lifecycle::{ProxyController, StartReport, StopReport};
pub use token::{RotationOutcome, TokenManager};
