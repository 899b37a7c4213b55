//! Pipeline phases.
//!
//! # Responsibilities
//! - Identity-only phase markers
//! - Per-phase interceptor storage
//! - Relative ordering (`Before`/`After`) remembered for merges
//!
//! # Design Decisions
//! - Two phases with the same name are still different phases
//! - Phases are cheap to clone (shared allocation)

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::pipeline::engine::Interceptor;

/// A named ordering bucket within a pipeline.
///
/// Equality and hashing use the identity of the allocation created by
/// [`PipelinePhase::new`]; the name is only used in diagnostics.
#[derive(Clone)]
pub struct PipelinePhase {
    name: Arc<str>,
}

impl PipelinePhase {
    /// Create a new, unique phase.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
        }
    }

    /// Diagnostic name of the phase.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.name) as *const u8 as usize
    }
}

impl PartialEq for PipelinePhase {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.name, &other.name)
    }
}

impl Eq for PipelinePhase {}

impl Hash for PipelinePhase {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase(`{}`)", self.name)
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// How a phase was positioned when it was added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseRelation {
    /// Appended at the end.
    Last,
    /// Inserted directly before the given phase.
    Before(PipelinePhase),
    /// Inserted after the given phase.
    After(PipelinePhase),
}

/// A phase together with the interceptors registered under it.
pub(crate) struct PhaseContent<S, C> {
    pub(crate) phase: PipelinePhase,
    pub(crate) relation: PhaseRelation,
    pub(crate) interceptors: Vec<Interceptor<S, C>>,
}

impl<S, C> PhaseContent<S, C> {
    pub(crate) fn new(phase: PipelinePhase, relation: PhaseRelation) -> Self {
        Self {
            phase,
            relation,
            interceptors: Vec::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl<S, C> fmt::Debug for PhaseContent<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Phase `{}`, {} handlers",
            self.phase.name(),
            self.interceptors.len()
        )
    }
}
