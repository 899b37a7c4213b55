//! Interceptor pipeline engine.
//!
//! # Data Flow
//! ```text
//! Definition time:
//!     PipelinePhase[] → phase.rs (ordered phase list, relative inserts)
//!     intercept(phase, block) → per-phase interceptor lists
//!     merge(other) → stable union of phase orderings
//!
//! Execution time:
//!     execute(call, subject)
//!     → engine.rs (compile flat interceptor array, memoized per structure version)
//!     → context.rs (cursor: subject + position + frames)
//!     → interceptor[0] → ctx.proceed() → interceptor[1] → ... → end
//!     → Result<Subject, PipelineError>
//! ```
//!
//! # Design Decisions
//! - One logical flow per execution; interceptors never run in parallel
//! - `proceed` is a plain async call, so an interceptor resumes at the
//!   statement after it regardless of which worker polls the future
//! - Failures are ordinary `Err` values that unwind through every enclosing
//!   `proceed` call site
//! - The compiled array is immutable and shared between concurrent executions

pub mod context;
pub mod engine;
pub mod error;
pub mod phase;
pub mod trace;

pub use context::{ContextState, PipelineContext};
pub use engine::{Interceptor, InterceptorFuture, Pipeline};
pub use error::{BoxError, PipelineError};
pub use phase::{PhaseRelation, PipelinePhase};
pub use trace::{CallFrame, CallTrace};
