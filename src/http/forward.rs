//! The forwarding handler.
//!
//! Every inbound request, whatever its method or path, goes through
//! [`proxy_handler`]:
//!
//! ```text
//! snapshot bearer token
//!     → destination base path + inbound path + query
//!     → copy headers, attach Authorization
//!     → UpstreamClient::send (slot + deadline)
//!     → relay redirect or stream body back
//! ```

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
};

use crate::error::ForwardError;
use crate::http::request::{apply_bearer, copy_request_headers, is_bodyless};
use crate::http::response::relay_response;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Forward one request and map any failure to its status code.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            match &e {
                ForwardError::Timeout(_) | ForwardError::Upstream(_) => {
                    tracing::warn!(error = %e, kind = e.kind(), "Forwarding failed")
                }
                ForwardError::Target(_) | ForwardError::Internal(_) => {
                    tracing::error!(error = %e, kind = e.kind(), "Forwarding failed")
                }
            }
            metrics::record_upstream_error(e.kind());
            e.into_response()
        }
    };

    tracing::debug!(
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Response head sent"
    );
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

/// Build the outbound request, send it, and relay the upstream response.
pub async fn forward(state: &AppState, request: Request<Body>) -> Result<Response, ForwardError> {
    // Taken before anything else so a concurrent rotation cannot split a request.
    let bearer = state.tokens.bearer();

    let (parts, body) = request.into_parts();
    let bodyless = is_bodyless(&parts.method);
    let uri = state.destination.uri_for(parts.uri.path_and_query())?;

    let mut headers = copy_request_headers(&parts.headers, bodyless);
    if let Some(token) = &bearer {
        apply_bearer(&mut headers, token)
            .map_err(|e| ForwardError::Internal(format!("bearer header: {e}")))?;
    }

    let body = if bodyless { Body::empty() } else { body };
    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .body(body)
        .map_err(|e| ForwardError::Internal(e.to_string()))?;
    *outbound.headers_mut() = headers;

    tracing::debug!(
        method = %outbound.method(),
        uri = %outbound.uri(),
        authenticated = bearer.is_some(),
        "Forwarding request"
    );

    let upstream = state.upstream.send(outbound).await?;
    tracing::debug!(status = %upstream.head.status, "Upstream responded");

    Ok(relay_response(upstream))
}
