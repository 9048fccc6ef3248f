//! Upstream subsystem: the single fixed destination.
//!
//! # Data Flow
//! ```text
//! inbound path + query
//!     → destination.rs (base URL + path prefix → outbound URI)
//!     → client.rs (slot, deadline, pooled hyper client, rustls)
//!     → UpstreamResponse (head + streaming body holding the slot)
//! ```

pub mod client;
pub mod destination;

pub use client::{UpstreamClient, UpstreamResponse};
pub use destination::{Destination, DestinationError};
