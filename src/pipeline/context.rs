//! Per-execution pipeline cursor.
//!
//! # Responsibilities
//! - Carry the subject and the call through the compiled chain
//! - Drive interceptors one at a time (`proceed`, `proceed_with`)
//! - Short-circuit (`finish`) and abort (`fail`)
//! - Record the logical call stack for diagnostics
//!
//! # State Machine
//! ```text
//! Created → Running → Finished
//!                   ↘ Failed
//! ```
//! - `proceed` after `finish` is a no-op
//! - `proceed` after a failure returns `PipelineError::Terminated`
//! - A failure aborts the rest of the chain; an enclosing interceptor that
//!   recovers from it lets the execution complete with the current subject

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::pipeline::engine::{CompiledInterceptor, Pipeline};
use crate::pipeline::error::{BoxError, PipelineError};
use crate::pipeline::trace::{CallFrame, CallTrace};

/// Lifecycle of a [`PipelineContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Running,
    Finished,
    Failed,
}

/// Mutable state of one pipeline execution.
pub struct PipelineContext<S, C> {
    call: C,
    subject: S,
    pipeline: Arc<str>,
    interceptors: Arc<[CompiledInterceptor<S, C>]>,
    index: usize,
    state: ContextState,
    /// Compiled-array positions of the interceptors currently on the stack.
    active: Vec<usize>,
    /// Frames of the forking context, if this execution is a fork.
    parent: Arc<[CallFrame]>,
    cancellation: Option<CancellationToken>,
}

impl<S, C> PipelineContext<S, C>
where
    S: Send + 'static,
    C: Send + 'static,
{
    pub(crate) fn new(
        pipeline: Arc<str>,
        interceptors: Arc<[CompiledInterceptor<S, C>]>,
        call: C,
        subject: S,
        parent: Arc<[CallFrame]>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            call,
            subject,
            pipeline,
            interceptors,
            index: 0,
            state: ContextState::Created,
            active: Vec::new(),
            parent,
            cancellation,
        }
    }

    /// The call object this execution belongs to.
    pub fn call(&self) -> &C {
        &self.call
    }

    /// Current subject value.
    pub fn subject(&self) -> &S {
        &self.subject
    }

    pub fn subject_mut(&mut self) -> &mut S {
        &mut self.subject
    }

    /// Replace the subject without proceeding.
    pub fn set_subject(&mut self, subject: S) {
        self.subject = subject;
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Name of the executing pipeline.
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    /// Run the remaining interceptors with the current subject.
    ///
    /// Returns once every downstream interceptor has completed; the caller
    /// continues at the statement after `proceed().await` and may inspect
    /// the (possibly transformed) subject via [`subject`](Self::subject).
    pub async fn proceed(&mut self) -> Result<(), PipelineError> {
        match self.state {
            ContextState::Failed => return Err(PipelineError::Terminated),
            ContextState::Finished => return Ok(()),
            ContextState::Created | ContextState::Running => {}
        }
        self.state = ContextState::Running;

        while self.index < self.interceptors.len() {
            let position = self.index;
            self.index += 1;

            if self.is_cancelled() {
                return Err(self.abort(PipelineError::Cancelled {
                    trace: CallTrace::default(),
                }));
            }

            let block = Arc::clone(&self.interceptors[position].block);
            self.active.push(position);
            let outcome = block(self).await;

            if let Err(error) = outcome {
                let error = self.abort(error);
                self.active.pop();
                return Err(error);
            }
            self.active.pop();
        }

        Ok(())
    }

    /// Replace the subject, then [`proceed`](Self::proceed).
    pub async fn proceed_with(&mut self, subject: S) -> Result<(), PipelineError> {
        self.subject = subject;
        self.proceed().await
    }

    /// Skip all remaining interceptors and complete successfully.
    pub fn finish(&mut self) {
        self.index = self.interceptors.len();
        if self.state != ContextState::Failed {
            self.state = ContextState::Finished;
        }
    }

    /// Abort the chain with `cause`.
    ///
    /// The returned error carries the current call trace and must be
    /// returned from the interceptor: `return Err(ctx.fail(cause));`
    pub fn fail(&mut self, cause: impl Into<BoxError>) -> PipelineError {
        self.abort(PipelineError::failed(cause))
    }

    /// True once the execution's cancellation token fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Await `future` unless the execution is cancelled first.
    ///
    /// Cancellation surfaces as `PipelineError::Cancelled`, so it unwinds
    /// through enclosing `proceed` calls like any other failure.
    pub fn cancellable<F, T>(&self, future: F) -> impl Future<Output = Result<T, PipelineError>> + Send
    where
        F: Future<Output = T> + Send,
        T: Send,
    {
        let token = self.cancellation.clone();
        let trace = self.capture_trace();
        async move {
            match token {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(PipelineError::Cancelled { trace }),
                    value = future => Ok(value),
                },
                None => Ok(future.await),
            }
        }
    }

    /// Execute `pipeline` as a nested fork of this execution.
    ///
    /// The child gets its own context; its frames are reported under the
    /// frames of this context and it inherits the cancellation token.
    pub fn fork<'p, S2, C2>(
        &self,
        pipeline: &'p Pipeline<S2, C2>,
        call: C2,
        subject: S2,
    ) -> impl Future<Output = Result<S2, PipelineError>> + Send + 'p
    where
        S2: Send + 'static,
        C2: Send + 'static,
    {
        let parent: Arc<[CallFrame]> = self.capture_trace().frames().to_vec().into();
        pipeline.run(call, subject, parent, self.cancellation.clone())
    }

    /// Logical frames active right now, outermost first.
    pub fn capture_trace(&self) -> CallTrace {
        let mut frames = self.parent.to_vec();
        frames.extend(self.active.iter().map(|&index| CallFrame {
            pipeline: Arc::clone(&self.pipeline),
            phase: self.interceptors[index].phase.clone(),
            index,
        }));
        CallTrace::new(frames)
    }

    pub(crate) fn into_subject(self) -> S {
        self.subject
    }

    pub(crate) fn complete(&mut self) {
        self.state = ContextState::Finished;
    }

    fn abort(&mut self, error: PipelineError) -> PipelineError {
        self.index = self.interceptors.len();
        self.state = ContextState::Failed;
        error.with_trace(|| self.capture_trace())
    }
}
