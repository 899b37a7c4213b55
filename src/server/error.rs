//! Server error types.

use axum::http::StatusCode;
use thiserror::Error;

use crate::codec::CodecError;
use crate::di::DependencyError;
use crate::pipeline::PipelineError;
use crate::routing::LocationError;

/// Errors raised while building an application or serving a call.
///
/// Failures inside a call travel as `PipelineError::Failed` with one of
/// these as the cause; [`ServerError::status`] picks the response code when
/// no plugin recovers.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("None of the accepted media types can be produced: {0}")]
    NotAcceptable(String),

    #[error("A response was already sent for this call")]
    AlreadyResponded,

    #[error("No transformation rendered the {0} response content")]
    Unrendered(&'static str),

    #[error("Plugin `{0}` is already installed")]
    DuplicatePlugin(&'static str),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServerError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            ServerError::Codec(CodecError::Decode { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response code for a failed call pipeline.
    pub fn status_for(error: &PipelineError) -> StatusCode {
        error
            .downcast_ref::<ServerError>()
            .map(ServerError::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
