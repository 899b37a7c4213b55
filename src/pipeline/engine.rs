//! Pipeline definition, compilation and execution.
//!
//! # Responsibilities
//! - Maintain the ordered phase list
//! - Register interceptors per phase
//! - Merge pipelines defined independently (plugins)
//! - Compile a flat interceptor array and drive a context through it
//!
//! # Design Decisions
//! - Compilation is memoized; any structural mutation drops the cache
//! - Mutation needs `&mut self`, so registration always completes before
//!   executions that share the pipeline by reference
//! - Executions share the compiled array through an `Arc` and nothing else

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::PipelineError;
use crate::pipeline::phase::{PhaseContent, PhaseRelation, PipelinePhase};
use crate::pipeline::trace::CallFrame;

/// Future returned by an interceptor.
pub type InterceptorFuture<'a> = BoxFuture<'a, Result<(), PipelineError>>;

/// A unit of behaviour registered into a phase.
///
/// Interceptors are plain closures: `|ctx| Box::pin(async move { ... })`.
pub type Interceptor<S, C> =
    Arc<dyn for<'a> Fn(&'a mut PipelineContext<S, C>) -> InterceptorFuture<'a> + Send + Sync>;

/// An interceptor in the compiled array, tagged with its phase for traces.
pub(crate) struct CompiledInterceptor<S, C> {
    pub(crate) phase: PipelinePhase,
    pub(crate) block: Interceptor<S, C>,
}

struct Compiled<S, C> {
    version: u64,
    interceptors: Arc<[CompiledInterceptor<S, C>]>,
}

/// An ordered set of phases, each holding an ordered list of interceptors.
pub struct Pipeline<S, C> {
    name: Arc<str>,
    phases: Vec<PhaseContent<S, C>>,
    interceptor_count: usize,
    version: u64,
    compiled: ArcSwapOption<Compiled<S, C>>,
}

impl<S, C> Pipeline<S, C>
where
    S: Send + 'static,
    C: Send + 'static,
{
    /// Create a pipeline with the given phases, in order.
    pub fn new(phases: &[PipelinePhase]) -> Self {
        Self::with_name("pipeline", phases)
    }

    /// Create a pipeline with a diagnostic name.
    pub fn with_name(name: impl AsRef<str>, phases: &[PipelinePhase]) -> Self {
        let mut pipeline = Self {
            name: Arc::from(name.as_ref()),
            phases: Vec::with_capacity(phases.len()),
            interceptor_count: 0,
            version: 0,
            compiled: ArcSwapOption::empty(),
        };
        for phase in phases {
            pipeline.add_phase(phase.clone());
        }
        pipeline
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Phases in execution order.
    pub fn phases(&self) -> Vec<PipelinePhase> {
        self.phases.iter().map(|content| content.phase.clone()).collect()
    }

    pub fn has_phase(&self, phase: &PipelinePhase) -> bool {
        self.find(phase).is_some()
    }

    /// True when no interceptor is registered in any phase.
    pub fn is_empty(&self) -> bool {
        self.interceptor_count == 0
    }

    pub fn interceptor_count(&self) -> usize {
        self.interceptor_count
    }

    /// Incremented on every structural change.
    pub fn structure_version(&self) -> u64 {
        self.version
    }

    /// Append `phase` unless it is already present.
    pub fn add_phase(&mut self, phase: PipelinePhase) {
        if self.has_phase(&phase) {
            return;
        }
        self.phases.push(PhaseContent::new(phase, PhaseRelation::Last));
        self.invalidate();
    }

    /// Insert `phase` directly before `reference`.
    pub fn insert_phase_before(
        &mut self,
        reference: &PipelinePhase,
        phase: PipelinePhase,
    ) -> Result<(), PipelineError> {
        if self.has_phase(&phase) {
            return Ok(());
        }
        let index = self.require(reference)?;
        self.phases.insert(
            index,
            PhaseContent::new(phase, PhaseRelation::Before(reference.clone())),
        );
        self.invalidate();
        Ok(())
    }

    /// Insert `phase` after `reference`.
    ///
    /// Phases inserted after the same reference keep their insertion order.
    pub fn insert_phase_after(
        &mut self,
        reference: &PipelinePhase,
        phase: PipelinePhase,
    ) -> Result<(), PipelineError> {
        if self.has_phase(&phase) {
            return Ok(());
        }
        let mut index = self.require(reference)?;
        while index + 1 < self.phases.len()
            && self.phases[index + 1].relation == PhaseRelation::After(reference.clone())
        {
            index += 1;
        }
        self.phases.insert(
            index + 1,
            PhaseContent::new(phase, PhaseRelation::After(reference.clone())),
        );
        self.invalidate();
        Ok(())
    }

    /// Register `block` at the end of `phase`.
    pub fn intercept<F>(&mut self, phase: &PipelinePhase, block: F) -> Result<(), PipelineError>
    where
        F: for<'a> Fn(&'a mut PipelineContext<S, C>) -> InterceptorFuture<'a> + Send + Sync + 'static,
    {
        self.intercept_arc(phase, Arc::new(block))
    }

    /// Register an already shared interceptor.
    pub fn intercept_arc(
        &mut self,
        phase: &PipelinePhase,
        block: Interceptor<S, C>,
    ) -> Result<(), PipelineError> {
        let index = self.require(phase)?;
        self.phases[index].interceptors.push(block);
        self.interceptor_count += 1;
        self.invalidate();
        Ok(())
    }

    /// Merge `other` into this pipeline.
    ///
    /// Phases shared by both keep this pipeline's position. A phase only
    /// known to `other` is placed using its recorded relation when the
    /// referenced phase exists here, otherwise right after the nearest
    /// preceding shared phase (or before the next shared one when nothing
    /// precedes it). Interceptors of `other` run after this pipeline's
    /// interceptors of the same phase.
    pub fn merge(&mut self, other: &Pipeline<S, C>) {
        if other.phases.is_empty() {
            return;
        }

        let mut anchor: Option<usize> = None;
        for (position, content) in other.phases.iter().enumerate() {
            let index = match self.find(&content.phase) {
                Some(index) => index,
                None => {
                    let index = self.placement(other, position, &content.relation, anchor);
                    self.phases.insert(
                        index,
                        PhaseContent::new(content.phase.clone(), content.relation.clone()),
                    );
                    index
                }
            };

            if !content.is_empty() {
                self.phases[index]
                    .interceptors
                    .extend(content.interceptors.iter().cloned());
                self.interceptor_count += content.interceptors.len();
            }
            anchor = Some(index);
        }

        self.invalidate();
    }

    fn placement(
        &self,
        other: &Pipeline<S, C>,
        position: usize,
        relation: &PhaseRelation,
        anchor: Option<usize>,
    ) -> usize {
        match relation {
            PhaseRelation::Before(reference) => {
                if let Some(index) = self.find(reference) {
                    return index;
                }
            }
            PhaseRelation::After(reference) => {
                if let Some(mut index) = self.find(reference) {
                    while index + 1 < self.phases.len()
                        && self.phases[index + 1].relation == *relation
                    {
                        index += 1;
                    }
                    return index + 1;
                }
            }
            PhaseRelation::Last => {}
        }

        if let Some(anchor) = anchor {
            return anchor + 1;
        }

        other.phases[position + 1..]
            .iter()
            .find_map(|content| self.find(&content.phase))
            .unwrap_or(self.phases.len())
    }

    /// Execute the pipeline for `call`, starting with `subject`.
    pub async fn execute(&self, call: C, subject: S) -> Result<S, PipelineError> {
        self.run(call, subject, Arc::from(Vec::new()), None).await
    }

    /// Execute with a cancellation token checked before every interceptor
    /// and by [`PipelineContext::cancellable`].
    pub async fn execute_with_cancellation(
        &self,
        call: C,
        subject: S,
        token: CancellationToken,
    ) -> Result<S, PipelineError> {
        self.run(call, subject, Arc::from(Vec::new()), Some(token)).await
    }

    pub(crate) async fn run(
        &self,
        call: C,
        subject: S,
        parent: Arc<[CallFrame]>,
        cancellation: Option<CancellationToken>,
    ) -> Result<S, PipelineError> {
        let mut context = PipelineContext::new(
            Arc::clone(&self.name),
            self.compiled(),
            call,
            subject,
            parent,
            cancellation,
        );

        match context.proceed().await {
            Ok(()) => {
                context.complete();
                metrics::record_pipeline_execution(&self.name, "success");
                Ok(context.into_subject())
            }
            Err(error) => {
                tracing::debug!(
                    pipeline = %self.name,
                    error = %error,
                    trace = %error.trace().map(ToString::to_string).unwrap_or_default(),
                    "Pipeline execution failed"
                );
                metrics::record_pipeline_execution(&self.name, "failure");
                Err(error)
            }
        }
    }

    /// The compiled interceptor array for the current structure.
    pub(crate) fn compiled(&self) -> Arc<[CompiledInterceptor<S, C>]> {
        if let Some(compiled) = self.compiled.load_full() {
            if compiled.version == self.version {
                return Arc::clone(&compiled.interceptors);
            }
        }

        let interceptors: Arc<[CompiledInterceptor<S, C>]> = self
            .phases
            .iter()
            .flat_map(|content| {
                content.interceptors.iter().map(|block| CompiledInterceptor {
                    phase: content.phase.clone(),
                    block: Arc::clone(block),
                })
            })
            .collect();

        self.compiled.store(Some(Arc::new(Compiled {
            version: self.version,
            interceptors: Arc::clone(&interceptors),
        })));
        interceptors
    }

    fn find(&self, phase: &PipelinePhase) -> Option<usize> {
        self.phases.iter().position(|content| content.phase == *phase)
    }

    fn require(&self, phase: &PipelinePhase) -> Result<usize, PipelineError> {
        self.find(phase)
            .ok_or_else(|| PipelineError::InvalidPhase(phase.name().to_string()))
    }

    fn invalidate(&mut self) {
        self.version += 1;
        self.compiled.store(None);
    }
}

impl<S, C> fmt::Debug for Pipeline<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("phases", &self.phases)
            .field("interceptors", &self.interceptor_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop<S: Send + 'static>(pipeline: &mut Pipeline<S, ()>, phase: &PipelinePhase) {
        pipeline
            .intercept(phase, |ctx| Box::pin(async move { ctx.proceed().await }))
            .unwrap();
    }

    #[test]
    fn test_add_phase_is_idempotent() {
        let a = PipelinePhase::new("a");
        let mut pipeline: Pipeline<u32, ()> = Pipeline::new(&[a.clone()]);
        pipeline.add_phase(a.clone());
        assert_eq!(pipeline.phases(), vec![a]);
    }

    #[test]
    fn test_insert_relative_to_missing_phase() {
        let a = PipelinePhase::new("a");
        let b = PipelinePhase::new("b");
        let mut pipeline: Pipeline<u32, ()> = Pipeline::new(&[]);

        let err = pipeline.insert_phase_before(&a, b.clone()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPhase(name) if name == "a"));
        assert!(pipeline.insert_phase_after(&a, b).is_err());
    }

    #[test]
    fn test_insert_after_keeps_insertion_order() {
        let base = PipelinePhase::new("base");
        let first = PipelinePhase::new("first");
        let second = PipelinePhase::new("second");
        let tail = PipelinePhase::new("tail");
        let mut pipeline: Pipeline<u32, ()> = Pipeline::new(&[base.clone(), tail.clone()]);

        pipeline.insert_phase_after(&base, first.clone()).unwrap();
        pipeline.insert_phase_after(&base, second.clone()).unwrap();

        assert_eq!(pipeline.phases(), vec![base, first, second, tail]);
    }

    #[test]
    fn test_compiled_cache_invalidation() {
        let a = PipelinePhase::new("a");
        let mut pipeline: Pipeline<u32, ()> = Pipeline::new(&[a.clone()]);
        noop(&mut pipeline, &a);

        let first = pipeline.compiled();
        let again = pipeline.compiled();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.len(), 1);

        let version = pipeline.structure_version();
        noop(&mut pipeline, &a);
        assert!(pipeline.structure_version() > version);

        let rebuilt = pipeline.compiled();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.len(), 2);
    }

    #[test]
    fn test_merge_splices_unknown_phases() {
        let setup = PipelinePhase::new("setup");
        let call = PipelinePhase::new("call");
        let fallback = PipelinePhase::new("fallback");
        let auth = PipelinePhase::new("auth");
        let early = PipelinePhase::new("early");

        let mut base: Pipeline<u32, ()> =
            Pipeline::new(&[setup.clone(), call.clone(), fallback.clone()]);
        noop(&mut base, &call);

        // `other` only knows about a subset and adds its own phases
        let mut other: Pipeline<u32, ()> = Pipeline::new(&[early.clone(), call.clone()]);
        other.insert_phase_after(&call, auth.clone()).unwrap();
        noop(&mut other, &call);
        noop(&mut other, &auth);

        base.merge(&other);

        assert_eq!(
            base.phases(),
            vec![setup, early, call.clone(), auth, fallback]
        );
        assert_eq!(base.interceptor_count(), 3);
        assert_eq!(base.compiled().len(), 3);
    }

    #[test]
    fn test_merge_into_empty() {
        let a = PipelinePhase::new("a");
        let b = PipelinePhase::new("b");
        let mut other: Pipeline<u32, ()> = Pipeline::new(&[a.clone(), b.clone()]);
        noop(&mut other, &b);

        let mut empty: Pipeline<u32, ()> = Pipeline::new(&[]);
        empty.merge(&other);

        assert_eq!(empty.phases(), vec![a, b]);
        assert!(!empty.is_empty());
    }
}
