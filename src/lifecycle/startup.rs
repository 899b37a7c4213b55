//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging and metrics from configuration
//! - Check that every required dependency resolves before taking traffic
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last (traffic only when ready)

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::{logging, metrics};
use crate::server::{Application, HttpServer, ServerError};

pub fn init_observability(config: &ServerConfig) {
    logging::init_tracing(&config.observability);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }
}

/// Validate dependencies, bind and serve `application` until `shutdown`.
pub async fn serve(application: Application, config: ServerConfig, shutdown: &Shutdown) -> Result<(), ServerError> {
    application.dependencies().validate().await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        request_timeout_secs = config.timeouts.request_secs,
        "Listening for connections"
    );

    HttpServer::new(application, config).run(listener, shutdown).await
}
