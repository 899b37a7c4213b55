//! Typed route locations.
//!
//! # Data Flow
//! ```text
//! Location value
//!     → to_parameters (conversion.rs)
//!     → RouteLocationPattern::format (pattern.rs) + query string
//!     → href "/a/1/b?page=2"
//!
//! Request path + query
//!     → RouteLocationPattern::parse (pattern.rs)
//!     → merge query parameters (parameters.rs)
//!     → Location::from_parameters (conversion.rs)
//!     → typed Location value
//! ```
//!
//! # Design Decisions
//! - Patterns are validated when built, never while matching
//! - A nested location's pattern is its parent's pattern followed by its own
//! - Location metadata is computed once per type and cached

pub mod conversion;
pub mod error;
pub mod locations;
pub mod parameters;
pub mod pattern;

pub use conversion::{FromParameterValues, ToParameterValues};
pub use error::{LocationError, PatternError};
pub use locations::{Location, LocationInfo, LocationLogger, Locations, Root};
pub use parameters::Parameters;
pub use pattern::{RouteLocationPattern, Segment, VariableSubstitution};
