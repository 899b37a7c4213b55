//! HTTP transport for an [`Application`].
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (tracing, timeout, body limit)
//! - Convert between axum requests/responses and application calls
//! - Serve until the shutdown coordinator fires, then run dependency
//!   shutdown hooks

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::lifecycle::Shutdown;
use crate::server::application::Application;
use crate::server::call::ApplicationRequest;
use crate::server::error::ServerError;

/// HTTP server for an application.
pub struct HttpServer {
    application: Application,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(application: Application, config: ServerConfig) -> Self {
        Self { application, config }
    }

    /// The Axum router serving the application, with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", any(handle))
            .route("/{*path}", any(handle))
            .with_state(self.application.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(self.config.listener.max_body_bytes))
                    .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs))),
            )
    }

    /// Serve on `listener` until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let signal = shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                signal.wait().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        let hooks = self.application.shutdown();
        tracing::info!(shutdown_hooks = hooks, "HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn handle(State(application): State<Application>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Failed to read request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let request = ApplicationRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    };
    let outcome = application.handle(request).await;

    let mut response = Response::new(Body::from(outcome.body));
    *response.status_mut() = outcome.status;
    *response.headers_mut() = outcome.headers;
    response
}
