//! Client error types.

use thiserror::Error;

use crate::codec::CodecError;
use crate::pipeline::PipelineError;
use crate::routing::LocationError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid request url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid header `{0}`")]
    InvalidHeader(String),

    #[error("Request failed: {0}")]
    Engine(#[from] reqwest::Error),

    #[error("Request pipeline finished without sending the request")]
    NotSent,

    #[error("No transformation rendered the {0} request body")]
    Unrendered(&'static str),

    #[error("No transformation decoded the response body ({0})")]
    NoTransformation(String),

    #[error("Cannot decode response body: {0}")]
    Decode(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Pipeline(PipelineError),
}

/// Failures raised as `ClientError` inside an interceptor come back out
/// unwrapped; anything else stays a pipeline error.
impl From<PipelineError> for ClientError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Failed { source, trace } => match source.downcast::<ClientError>() {
                Ok(cause) => *cause,
                Err(source) => ClientError::Pipeline(PipelineError::Failed { source, trace }),
            },
            other => ClientError::Pipeline(other),
        }
    }
}
