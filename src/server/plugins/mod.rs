//! Built-in server plugins.
//!
//! ```text
//! Setup       CallId
//! Monitoring  CallLogging
//! Plugins     StatusPages (exception handlers)
//! Call        Routing
//! send Before       StatusPages (status handlers)
//! send Render       ContentNegotiation
//! receive Transform ContentNegotiation
//! ```

pub mod call_id;
pub mod call_logging;
pub mod content_negotiation;
pub mod routing;
pub mod status_pages;

pub use call_id::{CallId, RequestId, X_REQUEST_ID};
pub use call_logging::CallLogging;
pub use content_negotiation::ContentNegotiation;
pub use routing::Routing;
pub use status_pages::StatusPages;
