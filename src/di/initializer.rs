//! How a registered key produces its value.
//!
//! # Initializer Kinds
//! ```text
//! Explicit   provide() closure, started once, result shared by all callers
//! Implicit   a bound capability: resolves its Explicit origin, then casts
//! Ambiguous  several equally near candidates; fails when resolved
//! Value      fixed value (provide_value, dependency maps)
//! Null       explicitly absent value
//! Missing    placeholder awaiting a provider (concurrent startup)
//! ```
//!
//! # Design Decisions
//! - Explicit memoization installs a lazy shared future with a single
//!   compare-and-swap; racing callers adopt the winner's future and the
//!   loser's future is dropped without ever being polled
//! - No lock is held while an initializer runs

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tokio::sync::watch;

use crate::di::error::DependencyError;
use crate::di::key::DependencyKey;
use crate::di::policy::InitializerKind;
use crate::di::resolver::DependencyResolver;

/// A resolved value: an `Arc<T>` behind `dyn Any`.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type InstanceFuture = BoxFuture<'static, Result<Instance, DependencyError>>;
pub(crate) type InitFn = Arc<dyn Fn(DependencyResolver) -> InstanceFuture + Send + Sync>;
pub(crate) type CastFn = Arc<dyn Fn(Instance) -> Result<Instance, DependencyError> + Send + Sync>;
pub(crate) type ShutdownHook = Arc<dyn Fn(Instance) + Send + Sync>;

type SharedInstance = Shared<InstanceFuture>;

/// Erase `value` into an [`Instance`].
pub fn instance<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Instance {
    Arc::new(value)
}

/// Recover the `Arc<T>` stored in `instance`.
pub fn downcast<T: ?Sized + Send + Sync + 'static>(
    key: &DependencyKey,
    instance: &Instance,
) -> Result<Arc<T>, DependencyError> {
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| DependencyError::TypeMismatch {
            key: key.clone(),
            expected: std::any::type_name::<T>(),
        })
}

pub(crate) struct Explicit {
    pub(crate) key: DependencyKey,
    init: InitFn,
    deferred: ArcSwapOption<SharedInstance>,
    pub(crate) on_shutdown: Option<ShutdownHook>,
}

impl Explicit {
    pub(crate) fn new(key: DependencyKey, init: InitFn, on_shutdown: Option<ShutdownHook>) -> Self {
        Self {
            key,
            init,
            deferred: ArcSwapOption::empty(),
            on_shutdown,
        }
    }

    /// The shared computation, installed on first call.
    ///
    /// A caller that joins a computation still in flight records a wait
    /// edge for as long as it awaits, so two chains waiting on each other
    /// fail with `Circular` instead of hanging.
    fn deferred(&self, resolver: &DependencyResolver) -> Result<InstanceFuture, DependencyError> {
        let scoped = resolver.enter(&self.key)?;

        let shared = match self.deferred.load_full() {
            Some(existing) => (*existing).clone(),
            None => {
                let init = Arc::clone(&self.init);
                let fresh: SharedInstance = async move { init(scoped).await }.boxed().shared();
                let previous = self
                    .deferred
                    .compare_and_swap(&None::<Arc<SharedInstance>>, Some(Arc::new(fresh.clone())));
                match &*previous {
                    None => fresh,
                    Some(winner) => (**winner).clone(),
                }
            }
        };

        let Some(waiter) = resolver.chain().last() else {
            return Ok(shared.boxed());
        };
        if shared.peek().is_some() {
            return Ok(shared.boxed());
        }

        let edge = resolver.graph().await_edge(waiter, &self.key)?;
        Ok(async move {
            let result = shared.await;
            drop(edge);
            result
        }
        .boxed())
    }

    /// True once some caller started the computation.
    pub(crate) fn is_started(&self) -> bool {
        self.deferred.load().is_some()
    }

    /// The value, if the computation already completed successfully.
    pub(crate) fn completed(&self) -> Option<Instance> {
        let deferred = self.deferred.load_full()?;
        match deferred.peek() {
            Some(Ok(instance)) => Some(Arc::clone(instance)),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub(crate) struct Implicit {
    pub(crate) origin: Arc<Explicit>,
    pub(crate) distance: u32,
    pub(crate) cast: CastFn,
}

#[derive(Clone)]
pub(crate) enum Placeholder {
    Waiting,
    Provided(Initializer),
    Closed,
}

/// A key requested before any provider registered it.
pub(crate) struct Missing {
    key: DependencyKey,
    state: watch::Sender<Placeholder>,
}

impl Missing {
    pub(crate) fn new(key: DependencyKey) -> Self {
        let (state, _) = watch::channel(Placeholder::Waiting);
        Self { key, state }
    }

    /// Hand waiting consumers a real initializer. Only the first call wins.
    pub(crate) fn provide(&self, initializer: Initializer) -> bool {
        self.state.send_if_modified(move |state| match state {
            Placeholder::Waiting => {
                *state = Placeholder::Provided(initializer);
                true
            }
            _ => false,
        })
    }

    /// Fail waiting consumers with `Missing`.
    pub(crate) fn close(&self) {
        self.state.send_if_modified(|state| match state {
            Placeholder::Waiting => {
                *state = Placeholder::Closed;
                true
            }
            _ => false,
        });
    }

    fn wait(&self) -> impl Future<Output = Result<Initializer, DependencyError>> + Send + 'static {
        let mut receiver = self.state.subscribe();
        let key = self.key.clone();
        async move {
            let settled = receiver
                .wait_for(|state| !matches!(state, Placeholder::Waiting))
                .await
                .map(|state| state.clone());
            match settled {
                Ok(Placeholder::Provided(initializer)) => Ok(initializer),
                _ => Err(DependencyError::Missing(key)),
            }
        }
    }
}

#[derive(Clone)]
pub(crate) enum Initializer {
    Explicit(Arc<Explicit>),
    Implicit(Implicit),
    Ambiguous {
        key: DependencyKey,
        distance: u32,
        candidates: Vec<Initializer>,
    },
    Value(Instance),
    Null(DependencyKey),
    Missing(Arc<Missing>),
}

impl Initializer {
    /// Combine candidates, flattening nested ambiguity.
    pub(crate) fn ambiguous(key: DependencyKey, previous: Initializer, current: Initializer) -> Self {
        let distance = [&previous, &current]
            .into_iter()
            .filter_map(|initializer| match initializer {
                Initializer::Implicit(implicit) => Some(implicit.distance),
                Initializer::Ambiguous { distance, .. } => Some(*distance),
                _ => None,
            })
            .min()
            .unwrap_or(0);
        let mut candidates = Vec::new();
        for initializer in [previous, current] {
            match initializer {
                Initializer::Ambiguous { candidates: nested, .. } => candidates.extend(nested),
                other => candidates.push(other),
            }
        }
        Initializer::Ambiguous {
            key,
            distance,
            candidates,
        }
    }

    pub(crate) fn kind(&self) -> Option<InitializerKind> {
        match self {
            Initializer::Explicit(_) => Some(InitializerKind::Explicit),
            Initializer::Implicit(implicit) => Some(InitializerKind::Implicit {
                distance: implicit.distance,
            }),
            Initializer::Ambiguous { distance, .. } => Some(InitializerKind::Ambiguous {
                distance: *distance,
            }),
            Initializer::Value(_) => Some(InitializerKind::Value),
            Initializer::Null(_) => Some(InitializerKind::Null),
            Initializer::Missing(_) => None,
        }
    }

    /// Key of the registration this initializer ultimately runs.
    pub(crate) fn origin_key(&self, own: &DependencyKey) -> DependencyKey {
        match self {
            Initializer::Explicit(explicit) => explicit.key.clone(),
            Initializer::Implicit(implicit) => implicit.origin.key.clone(),
            _ => own.clone(),
        }
    }

    /// True if replacing this initializer would orphan an already started value.
    pub(crate) fn is_started(&self) -> bool {
        match self {
            Initializer::Explicit(explicit) => explicit.is_started(),
            _ => false,
        }
    }

    pub(crate) fn resolve(&self, resolver: &DependencyResolver) -> InstanceFuture {
        match self {
            Initializer::Explicit(explicit) => explicit
                .deferred(resolver)
                .unwrap_or_else(|error| future::ready(Err(error)).boxed()),
            Initializer::Implicit(implicit) => {
                let origin = Initializer::Explicit(Arc::clone(&implicit.origin)).resolve(resolver);
                let cast = Arc::clone(&implicit.cast);
                async move { cast(origin.await?) }.boxed()
            }
            Initializer::Ambiguous { key, candidates, .. } => {
                let implementations = candidates
                    .iter()
                    .map(|candidate| candidate.origin_key(key))
                    .collect();
                future::ready(Err(DependencyError::Ambiguous {
                    key: key.clone(),
                    implementations,
                }))
                .boxed()
            }
            Initializer::Value(value) => future::ready(Ok(Arc::clone(value))).boxed(),
            Initializer::Null(key) => future::ready(Err(DependencyError::Missing(key.clone()))).boxed(),
            Initializer::Missing(placeholder) => {
                let wait = placeholder.wait();
                let resolver = resolver.clone();
                async move {
                    let provided = wait.await?;
                    provided.resolve(&resolver).await
                }
                .boxed()
            }
        }
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initializer::Explicit(explicit) => write!(f, "Explicit({})", explicit.key),
            Initializer::Implicit(implicit) => {
                write!(f, "Implicit({}, distance {})", implicit.origin.key, implicit.distance)
            }
            Initializer::Ambiguous { key, candidates, .. } => {
                write!(f, "Ambiguous({}, {} candidates)", key, candidates.len())
            }
            Initializer::Value(_) => f.write_str("Value"),
            Initializer::Null(key) => write!(f, "Null({})", key),
            Initializer::Missing(placeholder) => write!(f, "Missing({})", placeholder.key),
        }
    }
}
