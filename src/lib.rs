//! Interceptor-pipeline HTTP framework: server, client, typed locations and
//! dependency injection over one phase-ordered pipeline engine.

pub mod client;
pub mod codec;
pub mod config;
pub mod content;
pub mod di;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod server;

pub use client::{HttpClient, HttpRequestBuilder, HttpResponse};
pub use config::schema::ServerConfig;
pub use di::DependencyGraph;
pub use lifecycle::Shutdown;
pub use pipeline::{Pipeline, PipelineContext, PipelineError, PipelinePhase};
pub use routing::{Location, Locations};
pub use server::{Application, ApplicationBuilder, ApplicationCall, HttpServer};
