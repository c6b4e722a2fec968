//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the version probe and WebDAV dispatch
//! - Wire up middleware (tracing, request ID)
//! - Serve connections the switch listener surfaces as HTTP
//!
//! # Design Decisions
//! - Every path except the version probe belongs to WebDAV sessions, so
//!   dispatch is the router's fallback
//! - Request IDs are set before tracing so spans carry them

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    response::Response,
    routing::get,
    Router,
};
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::dav::SessionDirectory;
use crate::lifecycle::shutdown;
use crate::net::SwitchListener;

/// Path answering with [`hub_version`].
pub const VERSION_PATH: &str = "/proc/lcode-version";

/// Name and version this hub reports about itself.
pub fn hub_version() -> String {
    format!("lcode-hub@{}", env!("CARGO_PKG_VERSION"))
}

/// UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// HTTP server for WebDAV sessions.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self {
            router: Self::build_router(directory),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(directory: Arc<SessionDirectory>) -> Router {
        Router::new()
            .route(VERSION_PATH, get(version_handler).fallback(dispatch_handler))
            .fallback(dispatch_handler)
            .with_state(directory)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http()),
            )
    }

    /// The router, for serving it some other way.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve surfaced connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: SwitchListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %listener.local_addr(), "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn version_handler() -> String {
    hub_version()
}

async fn dispatch_handler(
    State(directory): State<Arc<SessionDirectory>>,
    request: Request<Body>,
) -> Response {
    directory.dispatch(request).await
}
