//! Upstream response handling.
//!
//! # Responsibilities
//! - Strip connection-scoped headers from the upstream response
//! - Pass 301/302 redirects back to the client instead of following them
//! - Stream everything else through without buffering
//!
//! # Design Decisions
//! - A redirect is relayed with its `Location` and an empty body; the
//!   upstream body is dropped, which releases the outbound slot
//! - Other statuses (including 4xx/5xx from upstream) are relayed unchanged

use axum::body::Body;
use axum::http::{
    header::{CONNECTION, LOCATION},
    HeaderMap, HeaderValue, StatusCode,
};
use axum::response::Response;

use crate::http::request::PROXY_CONNECTION;
use crate::upstream::UpstreamResponse;

/// Remove headers that describe the upstream connection, not the payload.
pub fn strip_response_headers(headers: &mut HeaderMap) {
    headers.remove(CONNECTION);
    headers.remove(PROXY_CONNECTION);
}

/// `Location` of a redirect that should be relayed as-is.
pub fn redirect_location(status: StatusCode, headers: &HeaderMap) -> Option<&HeaderValue> {
    match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => headers.get(LOCATION),
        _ => None,
    }
}

/// Turn an upstream response into the client response.
pub fn relay_response(upstream: UpstreamResponse) -> Response {
    let location = redirect_location(upstream.head.status, &upstream.head.headers).cloned();
    if let Some(location) = location {
        tracing::debug!(status = %upstream.head.status, location = ?location, "Relaying redirect");
        let mut response = Response::new(Body::empty());
        *response.status_mut() = upstream.head.status;
        response.headers_mut().insert(LOCATION, location);
        return response;
    }

    let (mut head, body) = upstream.into_parts();
    strip_response_headers(&mut head.headers);
    Response::from_parts(head, body)
}
