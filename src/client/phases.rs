//! Phases of the client pipelines.
//!
//! ```text
//! request:  Before → State → Transform → Render → Send
//! response: Receive → Parse → Transform → State → After
//! ```

use std::sync::LazyLock;

use crate::pipeline::PipelinePhase;

/// Defaults applied before anything else looks at the request.
pub static BEFORE: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Before"));
pub static STATE: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("State"));
pub static TRANSFORM: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Transform"));
/// Turn the request body into bytes.
pub static RENDER: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Render"));
/// Last look at the finished request before the engine runs.
pub static SEND: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Send"));

pub static RECEIVE: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Receive"));
pub static PARSE: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Parse"));
/// Turn the response body into a value.
pub static RESPONSE_TRANSFORM: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Transform"));
pub static RESPONSE_STATE: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("State"));
pub static AFTER: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("After"));

pub fn request_phases() -> Vec<PipelinePhase> {
    [&BEFORE, &STATE, &TRANSFORM, &RENDER, &SEND]
        .into_iter()
        .map(|phase| PipelinePhase::clone(phase))
        .collect()
}

pub fn response_phases() -> Vec<PipelinePhase> {
    [&RECEIVE, &PARSE, &RESPONSE_TRANSFORM, &RESPONSE_STATE, &AFTER]
        .into_iter()
        .map(|phase| PipelinePhase::clone(phase))
        .collect()
}
