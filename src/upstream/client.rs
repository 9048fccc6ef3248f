//! Outbound HTTP client for the destination.
//!
//! # Responsibilities
//! - Own the pooled hyper client (plain HTTP and rustls HTTPS)
//! - Cap concurrent outbound requests with a semaphore
//! - Enforce the deadline for the upstream response head, and the same
//!   deadline between body chunks
//! - Tie the outbound slot to the response body so streaming keeps it held

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{response, Request, Response};
use futures_util::StreamExt;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower_http::timeout::TimeoutBody;

use crate::config::{LimitConfig, TimeoutConfig};
use crate::error::ForwardError;

type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Pooled client bound to the proxy's limits and deadline.
#[derive(Clone)]
pub struct UpstreamClient {
    client: HttpsClient,
    timeout: Duration,
    slots: Arc<Semaphore>,
}

impl UpstreamClient {
    /// Build a client from the frozen configuration.
    pub fn new(timeouts: &TimeoutConfig, limits: &LimitConfig) -> Result<Self, rustls::Error> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);

        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(limits.max_upstream_connections)
            .build(https);

        Ok(Self {
            client,
            timeout: timeouts.upstream(),
            slots: Arc::new(Semaphore::new(limits.max_upstream_connections)),
        })
    }

    /// Outbound slots not currently in use.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Send a request, waiting at most the configured deadline for a slot and
    /// the response head. On expiry the in-flight request future is dropped,
    /// which closes its connection.
    pub async fn send(&self, request: Request<Body>) -> Result<UpstreamResponse, ForwardError> {
        let attempt = async {
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ForwardError::Internal(e.to_string()))?;

            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| ForwardError::Upstream(error_chain(&e)))?;

            let (head, body) = response.into_parts();
            Ok::<_, ForwardError>(UpstreamResponse {
                head,
                body,
                idle_timeout: self.timeout,
                permit,
            })
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout(self.timeout)),
        }
    }
}

/// Upstream response whose body still holds an outbound slot.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub head: response::Parts,
    body: Incoming,
    idle_timeout: Duration,
    permit: OwnedSemaphorePermit,
}

impl UpstreamResponse {
    /// Convert into a streaming body. The slot is released when the body is
    /// fully read, dropped (client gone), or stalls for longer than the
    /// deadline between chunks, which ends it with an error.
    pub fn into_body(self) -> Body {
        let permit = self.permit;
        let body = TimeoutBody::new(self.idle_timeout, self.body);
        let stream = Body::new(body).into_data_stream().map(move |chunk| {
            let _slot = &permit;
            chunk
        });
        Body::from_stream(stream)
    }

    /// Split into the response head and the slot-holding body.
    pub fn into_parts(mut self) -> (response::Parts, Body) {
        let head = std::mem::replace(&mut self.head, Response::new(()).into_parts().0);
        (head, self.into_body())
    }
}

/// Flatten an error and its sources into one line; hyper's top-level
/// messages ("client error (Connect)") hide the useful part.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
