//! Logical call-stack diagnostics.
//!
//! Frames are recorded by the engine itself, independent of how the async
//! runtime lays out the underlying futures, so a trace reads the same
//! whether or not any interceptor suspended.

use std::fmt;
use std::sync::Arc;

use crate::pipeline::phase::PipelinePhase;

/// One active interceptor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    /// Name of the pipeline executing the interceptor.
    pub pipeline: Arc<str>,
    /// Phase the interceptor was registered under.
    pub phase: PipelinePhase,
    /// Position in the compiled interceptor array.
    pub index: usize,
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}[{}]", self.pipeline, self.phase.name(), self.index)
    }
}

/// Ordered list of frames active at a failure, outermost first.
///
/// Frames from forking pipelines come before the frames of the nested
/// pipeline that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTrace {
    frames: Vec<CallFrame>,
}

impl CallTrace {
    pub(crate) fn new(frames: Vec<CallFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The innermost frame, i.e. the interceptor that failed.
    pub fn innermost(&self) -> Option<&CallFrame> {
        self.frames.last()
    }
}

impl fmt::Display for CallTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", frame)?;
        }
        Ok(())
    }
}
