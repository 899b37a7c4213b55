//! Phases of the server pipelines.
//!
//! ```text
//! call:    Setup → Monitoring → Plugins → Call → Fallback
//! send:    Before → Transform → Render → After
//! receive: Before → Transform → After
//! ```
//!
//! Phases compare by identity, so plugins must use these statics rather
//! than new phases with the same names.

use std::sync::LazyLock;

use crate::pipeline::PipelinePhase;

/// Prepare the call: ids, per-call context objects.
pub static SETUP: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Setup"));
/// Wrap the rest of the call for logging and metrics.
pub static MONITORING: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Monitoring"));
pub static PLUGINS: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Plugins"));
/// Handle the call (routing).
pub static CALL: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Call"));
/// Runs for calls nobody handled.
pub static FALLBACK: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Fallback"));

pub static SEND_BEFORE: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Before"));
pub static SEND_TRANSFORM: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Transform"));
/// Turn values into bytes.
pub static SEND_RENDER: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Render"));
pub static SEND_AFTER: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("After"));

pub static RECEIVE_BEFORE: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Before"));
/// Turn bytes into values.
pub static RECEIVE_TRANSFORM: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("Transform"));
pub static RECEIVE_AFTER: LazyLock<PipelinePhase> = LazyLock::new(|| PipelinePhase::new("After"));

pub fn call_phases() -> Vec<PipelinePhase> {
    [&SETUP, &MONITORING, &PLUGINS, &CALL, &FALLBACK]
        .into_iter()
        .map(|phase| PipelinePhase::clone(phase))
        .collect()
}

pub fn send_phases() -> Vec<PipelinePhase> {
    [&SEND_BEFORE, &SEND_TRANSFORM, &SEND_RENDER, &SEND_AFTER]
        .into_iter()
        .map(|phase| PipelinePhase::clone(phase))
        .collect()
}

pub fn receive_phases() -> Vec<PipelinePhase> {
    [&RECEIVE_BEFORE, &RECEIVE_TRANSFORM, &RECEIVE_AFTER]
        .into_iter()
        .map(|phase| PipelinePhase::clone(phase))
        .collect()
}
