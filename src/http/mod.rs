//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net/listener.rs)
//!     → server.rs (hyper HTTP/1.1, Axum router, request span)
//!     → forward.rs (token snapshot, target URI)
//!     → request.rs (header copy, Authorization)
//!     → upstream/client.rs (send within deadline)
//!     → response.rs (redirect passthrough, streaming body)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::proxy_handler;
pub use request::RequestId;
pub use server::{build_router, serve, AppState};
