//! Routing error types.

use thiserror::Error;

/// Faults raised while building, formatting or parsing a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("Segment `{0}` contains more than one substitution")]
    MultipleSubstitutions(String),

    #[error("Segment `{0}` contains a substitution without a name")]
    UnnamedSubstitution(String),

    #[error("Segment `{0}` has malformed braces")]
    MalformedBraces(String),

    #[error("Ellipsis substitution `{0}` must be the last segment and cannot have a suffix")]
    MisplacedEllipsis(String),

    #[error("No value for required parameter `{0}`")]
    MissingValue(String),

    #[error("Parameter `{0}` has an empty value")]
    EmptyValue(String),

    #[error("Path `{path}` does not match pattern `{pattern}`")]
    Mismatch { path: String, pattern: String },
}

/// Faults raised by the typed location registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("Request parameter `{name}` of type `{type_name}` is missing")]
    MissingParameter { name: String, type_name: String },

    #[error("Request parameter `{name}` couldn't be converted to `{type_name}`: {reason}")]
    ParameterConversion {
        name: String,
        type_name: String,
        reason: String,
    },

    #[error("Path parameters {names:?} are not declared by location `{location}`")]
    UnboundPathParameters { location: String, names: Vec<String> },

    #[error("Cyclic dependencies in locations are not allowed: `{0}`")]
    Cyclic(String),
}

impl LocationError {
    /// Name of the parameter a conversion fault refers to.
    pub fn parameter_name(&self) -> Option<&str> {
        match self {
            LocationError::MissingParameter { name, .. }
            | LocationError::ParameterConversion { name, .. } => Some(name),
            _ => None,
        }
    }
}
