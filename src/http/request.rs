//! Outbound request preparation.
//!
//! # Responsibilities
//! - Generate a request ID for log correlation (never forwarded)
//! - Copy inbound headers minus the ones this proxy owns
//! - Attach the bearer token snapshot
//!
//! # Design Decisions
//! - Multi-valued headers are appended, not collapsed
//! - GET and HEAD go out without a body, so their framing headers are dropped
//! - Any client-supplied `Authorization` passes through unless a token replaces it

use std::fmt;

use axum::http::{
    header::{AUTHORIZATION, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING},
    HeaderMap, HeaderName, HeaderValue, Method,
};
use axum::http::header::InvalidHeaderValue;
use uuid::Uuid;

/// Non-standard hop header some clients still send to proxies.
pub const PROXY_CONNECTION: &str = "proxy-connection";

/// Per-request identifier used in tracing spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Methods forwarded without a request body.
pub fn is_bodyless(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn is_stripped(name: &HeaderName, bodyless: bool) -> bool {
    if name == HOST || name == CONNECTION || name.as_str() == PROXY_CONNECTION {
        return true;
    }
    bodyless && (name == CONTENT_LENGTH || name == TRANSFER_ENCODING)
}

/// Copy client headers for the outbound request.
///
/// `Host` is rebuilt by the client from the destination authority.
pub fn copy_request_headers(inbound: &HeaderMap, bodyless: bool) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if is_stripped(name, bodyless) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound
}

/// Set `Authorization: Bearer <token>`, replacing any client value.
pub fn apply_bearer(headers: &mut HeaderMap, token: &str) -> Result<(), InvalidHeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}
