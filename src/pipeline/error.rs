//! Pipeline error types.

use thiserror::Error;

use crate::pipeline::trace::CallTrace;

/// Boxed cause carried by a failed execution.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while defining or executing a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An interceptor or relative insert targeted a phase that was never added.
    #[error("Phase `{0}` was not registered for this pipeline")]
    InvalidPhase(String),

    /// The execution observed its cancellation token.
    #[error("Pipeline execution was cancelled")]
    Cancelled { trace: CallTrace },

    /// `proceed` was called on a context whose chain already failed.
    #[error("Pipeline context was already terminated by a failure")]
    Terminated,

    /// An interceptor failed, either by returning an error or via `fail`.
    #[error("{source}")]
    Failed { source: BoxError, trace: CallTrace },
}

impl PipelineError {
    /// Wrap an arbitrary cause. The trace is filled in by the engine.
    pub fn failed(cause: impl Into<BoxError>) -> Self {
        PipelineError::Failed {
            source: cause.into(),
            trace: CallTrace::default(),
        }
    }

    /// Frames active when the failure was first observed.
    pub fn trace(&self) -> Option<&CallTrace> {
        match self {
            PipelineError::Failed { trace, .. } | PipelineError::Cancelled { trace } => Some(trace),
            _ => None,
        }
    }

    /// The original cause, if it has type `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            PipelineError::Failed { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }

    /// Attach `trace` unless a deeper one was already recorded.
    pub(crate) fn with_trace(mut self, captured: impl FnOnce() -> CallTrace) -> Self {
        match &mut self {
            PipelineError::Failed { trace, .. } | PipelineError::Cancelled { trace } if trace.is_empty() => {
                *trace = captured();
            }
            _ => {}
        }
        self
    }
}
