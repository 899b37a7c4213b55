//! Server side: calls, pipelines, plugins and the HTTP transport.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → engine.rs (axum catch-all, tower-http layers)
//!     → application.rs (ApplicationCall through the call pipeline)
//!     → plugins/ (ids, logging, status pages, routing)
//!     → call.rs respond() → send pipeline → committed response
//!     → engine.rs → client
//! ```

pub mod application;
pub mod call;
pub mod engine;
pub mod error;
pub mod phases;
pub mod plugins;

pub use application::{Application, ApplicationBuilder, CallPipeline, Plugin, ReceivePipeline, SendPipeline};
pub use call::{ApplicationCall, ApplicationRequest, ApplicationResponse};
pub use crate::content::{IncomingContent, OutgoingContent};
pub use engine::HttpServer;
pub use error::ServerError;
