//! HTTP server setup and the accept loop.
//!
//! # Responsibilities
//! - Create the Axum Router that sends every method and path to the forwarder
//! - Wire up middleware (tracing span with request ID, panic containment)
//! - Accept connections within the connection limit
//! - Serve each connection with HTTP/1.1 and close it gracefully on shutdown

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper::server::conn::http1;
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    service::TowerToHyperService,
};
use tokio::net::TcpStream;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::Span;

use crate::error::ForwardError;
use crate::http::forward::proxy_handler;
use crate::http::request::RequestId;
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener};
use crate::token::TokenManager;
use crate::upstream::{Destination, UpstreamClient};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub destination: Arc<Destination>,
    pub tokens: Arc<TokenManager>,
    pub upstream: UpstreamClient,
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}

fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %RequestId::new(),
        method = %request.method(),
        uri = %request.uri(),
    )
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");
    ForwardError::Internal("request handler panicked".into()).into_response()
}

/// Accept connections until `shutdown` fires, then drop the listener.
///
/// Connections already open keep running; each finishes its in-flight
/// request and closes once it observes the same signal.
pub async fn serve(
    listener: Listener,
    app: Router,
    mut shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
) {
    loop {
        let (stream, peer, permit) = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let guard = tracker.track();
        tracing::debug!(connection_id = %guard.id(), peer = %peer, "Connection accepted");
        tokio::spawn(serve_connection(
            stream,
            peer,
            app.clone(),
            shutdown.clone(),
            permit,
            guard,
        ));
    }

    tracing::info!("Listener closed");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    mut shutdown: ShutdownSignal,
    _permit: ConnectionPermit,
    guard: ConnectionGuard,
) {
    let service = TowerToHyperService::new(app);
    let connection = http1::Builder::new()
        .timer(TokioTimer::new())
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.recv() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };

    match result {
        Ok(()) => tracing::debug!(connection_id = %guard.id(), peer = %peer, "Connection closed"),
        Err(e) => tracing::debug!(
            connection_id = %guard.id(),
            peer = %peer,
            error = %e,
            "Connection ended with error"
        ),
    }
}
