//! Client plugins.

pub mod content_negotiation;
pub mod default_request;

pub use content_negotiation::ContentNegotiation;
pub use default_request::DefaultRequest;
