//! HTTP client.
//!
//! # Data Flow
//! ```text
//! HttpRequestBuilder
//!     → request pipeline (plugins: DefaultRequest, ContentNegotiation)
//!     → HttpClientEngine (reqwest by default)
//!     → response pipeline
//!     → HttpResponse
//! ```
//!
//! # Design Decisions
//! - The engine is a trait object so tests can run without sockets
//! - Failures raised as `ClientError` inside interceptors reach the caller
//!   unwrapped

#[allow(clippy::module_inception)]
pub mod client;
pub mod engine;
pub mod error;
pub mod phases;
pub mod plugins;
pub mod request;
pub mod response;

pub use client::{ClientCall, ClientPlugin, HttpClient, HttpClientBuilder, RequestPipeline, ResponsePipeline};
pub use engine::{HttpClientEngine, ReqwestEngine};
pub use error::ClientError;
pub use request::{HttpRequestBuilder, HttpRequestData};
pub use response::{HttpResponse, HttpResponseData};
