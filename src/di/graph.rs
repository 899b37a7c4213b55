//! The dependency graph: registration, lookup, startup and shutdown.
//!
//! # Data Flow
//! ```text
//! provide::<T>(init).bind::<dyn U>(cast).register()
//!     → Explicit(T) under key T
//!     → Implicit(T → U, distance) under key U
//!     → conflicts decided by the ConflictPolicy
//!
//! resolve::<U>()
//!     → declared initializers
//!     → included DependencyMaps (last included wins)
//!     → Missing placeholder (concurrent startup) or Missing error
//! ```
//!
//! # Design Decisions
//! - Registration takes `&self` so providers and consumers can run as
//!   concurrent startup tasks
//! - Shutdown hooks run newest first, only for values that were created

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::di::error::DependencyError;
use crate::di::initializer::{
    downcast, instance, CastFn, Explicit, Implicit, InitFn, Initializer, Instance, Missing, ShutdownHook,
};
use crate::di::key::DependencyKey;
use crate::di::maps::DependencyMap;
use crate::di::policy::{ConflictPolicy, ConflictResolution, DefaultConflictPolicy};
use crate::di::resolver::DependencyResolver;

/// How consumers behave when they request a key nobody provided yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyStartup {
    /// Fail immediately with `DependencyError::Missing`.
    #[default]
    Sequential,
    /// Wait for a provider until [`DependencyGraph::stop_waiting`].
    Concurrent,
}

pub(crate) struct GraphInner {
    map: DashMap<DependencyKey, Initializer>,
    order: Mutex<Vec<DependencyKey>>,
    requirements: Mutex<Vec<DependencyKey>>,
    external: ArcSwap<Vec<Arc<dyn DependencyMap>>>,
    policy: Arc<dyn ConflictPolicy>,
    waiting: AtomicBool,
    /// `(waiter, target)`: the initializer of `waiter` is awaiting the
    /// in-flight initializer of `target`.
    waits: Mutex<Vec<(DependencyKey, DependencyKey)>>,
}

impl GraphInner {
    pub(crate) fn lookup(&self, key: &DependencyKey, optional: bool) -> Result<Initializer, DependencyError> {
        if let Some(existing) = self.map.get(key) {
            return Ok(existing.value().clone());
        }

        for map in self.external.load().iter().rev() {
            if map.contains(key) {
                return map.get_instance(key).map(Initializer::Value);
            }
        }

        if optional {
            return Ok(Initializer::Null(key.clone()));
        }

        if self.waiting.load(Ordering::SeqCst) {
            return Ok(self.placeholder(key));
        }

        Err(DependencyError::Missing(key.clone()))
    }

    /// The entry for `key`, creating a waiting placeholder if absent.
    fn placeholder(&self, key: &DependencyKey) -> Initializer {
        let entry = self
            .map
            .entry(key.clone())
            .or_insert_with(|| Initializer::Missing(Arc::new(Missing::new(key.clone()))))
            .value()
            .clone();
        // stop_waiting may have swept the map before this entry landed.
        if !self.waiting.load(Ordering::SeqCst) {
            if let Initializer::Missing(missing) = &entry {
                missing.close();
            }
        }
        entry
    }

    fn insert(&self, key: DependencyKey, current: Initializer) -> Result<(), DependencyError> {
        let mut slot = match self.map.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(current);
                return Ok(());
            }
            Entry::Occupied(slot) => slot,
        };

        let previous = slot.get().clone();
        if let Initializer::Missing(placeholder) = &previous {
            let placeholder = Arc::clone(placeholder);
            slot.insert(current.clone());
            drop(slot);
            placeholder.provide(current);
            tracing::debug!(dependency = %key, "Provided a dependency consumers were waiting for");
            return Ok(());
        }

        let (Some(previous_kind), Some(current_kind)) = (previous.kind(), current.kind()) else {
            slot.insert(current);
            return Ok(());
        };

        match self.policy.resolve(&key, previous_kind, current_kind) {
            ConflictResolution::KeepPrevious => {
                tracing::debug!(dependency = %key, "Keeping previous registration");
                Ok(())
            }
            ConflictResolution::Replace if previous.is_started() => Err(DependencyError::OutOfOrder(key)),
            ConflictResolution::Replace => {
                slot.insert(current);
                Ok(())
            }
            ConflictResolution::Ambiguous if previous.is_started() => Err(DependencyError::OutOfOrder(key)),
            ConflictResolution::Ambiguous => {
                slot.insert(Initializer::ambiguous(key.clone(), previous, current));
                Ok(())
            }
            ConflictResolution::Conflict => Err(DependencyError::Duplicate(key)),
        }
    }

    fn remember(list: &Mutex<Vec<DependencyKey>>, key: &DependencyKey) {
        let mut keys = list.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }

    fn snapshot(list: &Mutex<Vec<DependencyKey>>) -> Vec<DependencyKey> {
        list.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Record that `waiter` awaits the in-flight `target`, unless `target`
    /// already (transitively) awaits `waiter`.
    pub(crate) fn await_edge(
        self: &Arc<Self>,
        waiter: &DependencyKey,
        target: &DependencyKey,
    ) -> Result<WaitEdge, DependencyError> {
        let mut edges = self.waits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(path) = wait_path(&edges, target, waiter) {
            let mut cycle = vec![waiter.clone()];
            cycle.extend(path);
            return Err(DependencyError::Circular(cycle));
        }
        edges.push((waiter.clone(), target.clone()));
        Ok(WaitEdge {
            graph: Arc::clone(self),
            waiter: waiter.clone(),
            target: target.clone(),
        })
    }
}

/// Keys from `start` to `goal` along wait edges, both ends included.
fn wait_path(
    edges: &[(DependencyKey, DependencyKey)],
    start: &DependencyKey,
    goal: &DependencyKey,
) -> Option<Vec<DependencyKey>> {
    let mut parents: HashMap<&DependencyKey, &DependencyKey> = HashMap::new();
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        if current == goal {
            let mut path = vec![current.clone()];
            let mut cursor = current;
            while let Some(&parent) = parents.get(cursor) {
                path.push(parent.clone());
                cursor = parent;
            }
            path.reverse();
            return Some(path);
        }
        for (from, to) in edges.iter().filter(|(from, _)| from == current) {
            if seen.insert(to) {
                parents.insert(to, from);
                queue.push_back(to);
            }
        }
    }
    None
}

/// Removes its wait edge when the awaiting future finishes or is dropped.
pub(crate) struct WaitEdge {
    graph: Arc<GraphInner>,
    waiter: DependencyKey,
    target: DependencyKey,
}

impl Drop for WaitEdge {
    fn drop(&mut self) {
        let mut edges = self.graph.waits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(index) = edges
            .iter()
            .position(|(waiter, target)| *waiter == self.waiter && *target == self.target)
        {
            edges.swap_remove(index);
        }
    }
}

/// Builder for [`DependencyGraph`].
#[derive(Debug)]
pub struct DependencyGraphBuilder {
    policy: Arc<dyn ConflictPolicy>,
    startup: DependencyStartup,
    maps: Vec<Arc<dyn DependencyMap>>,
}

impl DependencyGraphBuilder {
    pub fn conflict_policy(mut self, policy: impl ConflictPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn startup(mut self, startup: DependencyStartup) -> Self {
        self.startup = startup;
        self
    }

    /// Consult `map` for keys without a declared provider.
    pub fn include(mut self, map: impl DependencyMap + 'static) -> Self {
        self.maps.push(Arc::new(map));
        self
    }

    pub fn build(self) -> DependencyGraph {
        DependencyGraph {
            inner: Arc::new(GraphInner {
                map: DashMap::new(),
                order: Mutex::new(Vec::new()),
                requirements: Mutex::new(Vec::new()),
                external: ArcSwap::from_pointee(self.maps),
                policy: self.policy,
                waiting: AtomicBool::new(self.startup == DependencyStartup::Concurrent),
                waits: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// Shared registry of providers. Cloning is cheap.
#[derive(Clone)]
pub struct DependencyGraph {
    inner: Arc<GraphInner>,
}

impl DependencyGraph {
    /// Sequential startup with [`DefaultConflictPolicy`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder {
            policy: Arc::new(DefaultConflictPolicy),
            startup: DependencyStartup::Sequential,
            maps: Vec::new(),
        }
    }

    pub fn resolver(&self) -> DependencyResolver {
        DependencyResolver::new(Arc::clone(&self.inner))
    }

    /// Add an external map after construction.
    pub fn include(&self, map: impl DependencyMap + 'static) {
        let map: Arc<dyn DependencyMap> = Arc::new(map);
        self.inner.external.rcu(|maps| {
            let mut maps = Vec::clone(maps);
            maps.push(Arc::clone(&map));
            maps
        });
    }

    /// Declare how to create a `T`. Nothing runs until the first resolve.
    pub fn provide<T, F, Fut>(&self, init: F) -> Provision<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(DependencyResolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, DependencyError>> + Send + 'static,
    {
        let init: InitFn = Arc::new(move |resolver: DependencyResolver| {
            let created = init(resolver);
            async move { created.await.map(|value| instance(Arc::new(value))) }.boxed()
        });
        Provision {
            graph: self,
            key: DependencyKey::of::<T>(),
            init,
            bindings: Vec::new(),
            on_shutdown: None,
            _marker: PhantomData,
        }
    }

    pub fn provide_value<T: Send + Sync + 'static>(&self, value: T) -> Result<(), DependencyError> {
        self.provide_arc(DependencyKey::of::<T>(), Arc::new(value))
    }

    pub fn provide_named_value<T: Send + Sync + 'static>(&self, name: &str, value: T) -> Result<(), DependencyError> {
        self.provide_arc(DependencyKey::named::<T>(name), Arc::new(value))
    }

    /// Register an already shared value under `key`.
    pub fn provide_arc<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: DependencyKey,
        value: Arc<T>,
    ) -> Result<(), DependencyError> {
        self.inner.insert(key, Initializer::Value(instance(value)))
    }

    /// Declare `T` as intentionally absent: `resolve_optional` yields `None`.
    pub fn provide_null<T: ?Sized + 'static>(&self) -> Result<(), DependencyError> {
        let key = DependencyKey::of::<T>();
        self.inner.insert(key.clone(), Initializer::Null(key))
    }

    /// True if a provider or an included map can serve `key`.
    pub fn contains(&self, key: &DependencyKey) -> bool {
        let declared = self
            .inner
            .map
            .get(key)
            .map(|entry| !matches!(entry.value(), Initializer::Missing(_)))
            .unwrap_or(false);
        declared || self.inner.external.load().iter().any(|map| map.contains(key))
    }

    pub async fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, DependencyError> {
        self.resolver().resolve::<T>().await
    }

    pub async fn resolve_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, DependencyError> {
        self.resolver().resolve_named::<T>(name).await
    }

    /// Record `T` as needed by the application; checked by [`validate`](Self::validate).
    pub fn require<T: ?Sized + 'static>(&self) {
        self.require_key(DependencyKey::of::<T>());
    }

    pub fn require_key(&self, key: DependencyKey) {
        GraphInner::remember(&self.inner.requirements, &key);
    }

    /// Close the startup phase, then resolve every required key.
    ///
    /// Returns all failures at once.
    pub async fn validate(&self) -> Result<(), DependencyError> {
        self.stop_waiting();

        let resolver = self.resolver();
        let mut failures = Vec::new();
        for key in GraphInner::snapshot(&self.inner.requirements) {
            if let Err(error) = resolver.get_instance(&key).await {
                tracing::error!(dependency = %key, error = %error, "Cannot resolve dependency");
                failures.push((key, error));
            }
        }

        if failures.is_empty() {
            tracing::debug!("All dependencies resolved successfully");
            Ok(())
        } else {
            Err(DependencyError::Validation(failures))
        }
    }

    /// Fail every consumer still waiting for a provider; later lookups of
    /// unknown keys fail immediately.
    pub fn stop_waiting(&self) {
        if !self.inner.waiting.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut closed = 0usize;
        for entry in self.inner.map.iter() {
            if let Initializer::Missing(placeholder) = entry.value() {
                placeholder.close();
                closed += 1;
            }
        }
        tracing::debug!(placeholders = closed, "Dependency startup phase closed");
    }

    pub fn is_waiting(&self) -> bool {
        self.inner.waiting.load(Ordering::SeqCst)
    }

    /// Run shutdown hooks, newest registration first, for created values.
    ///
    /// Returns how many hooks ran.
    pub fn shutdown(&self) -> usize {
        let mut ran = 0;
        for key in GraphInner::snapshot(&self.inner.order).iter().rev() {
            let explicit = match self.inner.map.get(key).map(|entry| entry.value().clone()) {
                Some(Initializer::Explicit(explicit)) => explicit,
                _ => continue,
            };
            if let (Some(hook), Some(value)) = (&explicit.on_shutdown, explicit.completed()) {
                tracing::debug!(dependency = %key, "Running shutdown hook");
                hook(value);
                ran += 1;
            }
        }
        ran
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("registrations", &self.inner.map.len())
            .field("policy", &self.inner.policy)
            .field("waiting", &self.is_waiting())
            .finish()
    }
}

struct Binding {
    retype: fn(&DependencyKey) -> DependencyKey,
    distance: u32,
    cast: CastFn,
}

/// A pending registration; nothing is added until [`register`](Self::register).
#[must_use = "call `register` to add the provider to the graph"]
pub struct Provision<'g, T> {
    graph: &'g DependencyGraph,
    key: DependencyKey,
    init: InitFn,
    bindings: Vec<Binding>,
    on_shutdown: Option<ShutdownHook>,
    _marker: PhantomData<fn() -> T>,
}

impl<'g, T: Send + Sync + 'static> Provision<'g, T> {
    pub fn named(mut self, name: &str) -> Self {
        self.key = self.key.with_name(name);
        self
    }

    /// Also serve lookups of `U` (one step away).
    pub fn bind<U: ?Sized + Send + Sync + 'static>(
        self,
        cast: impl Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    ) -> Self {
        self.bind_at(1, cast)
    }

    /// Also serve lookups of `U`; nearer bindings win over farther ones.
    pub fn bind_at<U: ?Sized + Send + Sync + 'static>(
        mut self,
        distance: u32,
        cast: impl Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    ) -> Self {
        let origin = DependencyKey::of::<T>();
        self.bindings.push(Binding {
            retype: DependencyKey::retyped::<U>,
            distance,
            cast: Arc::new(move |value: Instance| {
                downcast::<T>(&origin, &value).map(|typed| instance(cast(typed)))
            }),
        });
        self
    }

    /// Run `hook` on the created value when the graph shuts down.
    pub fn on_shutdown(mut self, hook: impl Fn(Arc<T>) + Send + Sync + 'static) -> Self {
        let key = self.key.clone();
        self.on_shutdown = Some(Arc::new(move |value: Instance| match downcast::<T>(&key, &value) {
            Ok(value) => hook(value),
            Err(error) => tracing::warn!(error = %error, "Skipping shutdown hook"),
        }));
        self
    }

    pub fn register(self) -> Result<(), DependencyError> {
        let explicit = Arc::new(Explicit::new(self.key.clone(), self.init, self.on_shutdown));
        let inner = &self.graph.inner;

        inner.insert(self.key.clone(), Initializer::Explicit(Arc::clone(&explicit)))?;
        GraphInner::remember(&inner.order, &self.key);

        for binding in self.bindings {
            let key = (binding.retype)(&self.key);
            inner.insert(
                key,
                Initializer::Implicit(Implicit {
                    origin: Arc::clone(&explicit),
                    distance: binding.distance,
                    cast: binding.cast,
                }),
            )?;
        }

        tracing::debug!(dependency = %self.key, "Registered provider");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::properties::ConfigProperties;
    use crate::di::maps::{ConfigurationDependencyMap, MapDependencies};
    use crate::di::policy::IgnoreConflicts;
    use std::any::TypeId;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    struct French;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_string()
        }
    }

    #[derive(Debug, PartialEq)]
    struct Port(u16);

    struct Service {
        port: Arc<Port>,
    }

    #[tokio::test]
    async fn test_provider_resolves_its_dependencies() {
        let graph = DependencyGraph::new();
        graph.provide_value(Port(8080)).unwrap();
        graph
            .provide(|resolver: DependencyResolver| async move {
                let port = resolver.resolve::<Port>().await?;
                Ok::<_, DependencyError>(Service { port })
            })
            .register()
            .unwrap();

        let service = graph.resolve::<Service>().await.unwrap();
        assert_eq!(*service.port, Port(8080));
    }

    #[tokio::test]
    async fn test_equal_bindings_fail_only_when_resolved() {
        let graph = DependencyGraph::new();
        graph
            .provide(|_| async { Ok(English) })
            .bind::<dyn Greeter>(|english| english as Arc<dyn Greeter>)
            .register()
            .unwrap();
        graph
            .provide(|_| async { Ok(French) })
            .bind::<dyn Greeter>(|french| french as Arc<dyn Greeter>)
            .register()
            .unwrap();

        let error = graph.resolve::<dyn Greeter>().await.err().unwrap();
        match error {
            DependencyError::Ambiguous { implementations, .. } => assert_eq!(implementations.len(), 2),
            other => panic!("expected ambiguity, got {other}"),
        }

        // Direct keys are unaffected.
        assert_eq!(graph.resolve::<English>().await.unwrap().greet(), "hello");

        let french = graph
            .resolver()
            .resolve_where::<dyn Greeter, _>(|key| key.type_id() == TypeId::of::<French>())
            .await
            .unwrap();
        assert_eq!(french.greet(), "bonjour");
    }

    #[tokio::test]
    async fn test_nearer_binding_wins() {
        let graph = DependencyGraph::new();
        graph
            .provide(|_| async { Ok(English) })
            .bind_at::<dyn Greeter>(2, |english| english as Arc<dyn Greeter>)
            .register()
            .unwrap();
        graph
            .provide(|_| async { Ok(French) })
            .bind::<dyn Greeter>(|french| french as Arc<dyn Greeter>)
            .register()
            .unwrap();

        assert_eq!(graph.resolve::<dyn Greeter>().await.unwrap().greet(), "bonjour");
    }

    #[tokio::test]
    async fn test_direct_registration_replaces_binding() {
        let graph = DependencyGraph::new();
        graph
            .provide(|_| async { Ok(English) })
            .bind::<dyn Greeter>(|english| english as Arc<dyn Greeter>)
            .register()
            .unwrap();
        let french: Arc<dyn Greeter> = Arc::new(French);
        graph.provide_arc(DependencyKey::of::<dyn Greeter>(), french).unwrap();

        assert_eq!(graph.resolve::<dyn Greeter>().await.unwrap().greet(), "bonjour");
    }

    #[tokio::test]
    async fn test_self_dependency_is_circular() {
        struct Node;

        let graph = DependencyGraph::new();
        graph
            .provide(|resolver: DependencyResolver| async move {
                resolver.resolve::<Node>().await?;
                Ok::<_, DependencyError>(Node)
            })
            .register()
            .unwrap();

        match graph.resolve::<Node>().await {
            Err(DependencyError::Circular(chain)) => assert_eq!(chain.len(), 2),
            Err(other) => panic!("expected a cycle, got {other}"),
            Ok(_) => panic!("expected a cycle"),
        }
    }

    #[tokio::test]
    async fn test_two_key_cycle_reports_full_chain() {
        struct A;
        struct B;

        let graph = DependencyGraph::new();
        graph
            .provide(|resolver: DependencyResolver| async move {
                resolver.resolve::<B>().await?;
                Ok::<_, DependencyError>(A)
            })
            .register()
            .unwrap();
        graph
            .provide(|resolver: DependencyResolver| async move {
                resolver.resolve::<A>().await?;
                Ok::<_, DependencyError>(B)
            })
            .register()
            .unwrap();

        let error = graph.resolve::<A>().await.err().unwrap();
        let DependencyError::Circular(chain) = error else {
            panic!("expected a cycle");
        };
        assert_eq!(
            chain,
            vec![DependencyKey::of::<A>(), DependencyKey::of::<B>(), DependencyKey::of::<A>()]
        );
    }

    #[tokio::test]
    async fn test_cycle_across_concurrent_callers_fails() {
        struct A;
        struct B;

        let graph = DependencyGraph::new();
        graph
            .provide(|resolver: DependencyResolver| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                resolver.resolve::<B>().await?;
                Ok::<_, DependencyError>(A)
            })
            .register()
            .unwrap();
        graph
            .provide(|resolver: DependencyResolver| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                resolver.resolve::<A>().await?;
                Ok::<_, DependencyError>(B)
            })
            .register()
            .unwrap();

        let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(graph.resolve::<A>(), graph.resolve::<B>())
        })
        .await
        .expect("cross-chain cycle must not hang");

        assert!(matches!(a, Err(DependencyError::Circular(_))));
        assert!(matches!(b, Err(DependencyError::Circular(_))));
    }

    #[tokio::test]
    async fn test_wait_edges_cleared_after_join() {
        struct Leaf;
        struct Branch;

        let graph = DependencyGraph::new();
        graph
            .provide(|_| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, DependencyError>(Leaf)
            })
            .register()
            .unwrap();
        graph
            .provide(|resolver: DependencyResolver| async move {
                resolver.resolve::<Leaf>().await?;
                Ok::<_, DependencyError>(Branch)
            })
            .register()
            .unwrap();

        let (leaf, branch) = tokio::join!(graph.resolve::<Leaf>(), graph.resolve::<Branch>());
        assert!(leaf.is_ok() && branch.is_ok());
        assert!(graph.inner.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_resolution_initializes_once() {
        struct Slow;

        let calls = Arc::new(AtomicUsize::new(0));
        let graph = DependencyGraph::new();
        let counter = Arc::clone(&calls);
        graph
            .provide(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(Slow)
                }
            })
            .register()
            .unwrap();

        let results = futures_util::future::join_all((0..16).map(|_| graph.resolve::<Slow>())).await;
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiting_consumer_receives_late_provider() {
        let graph = DependencyGraph::builder()
            .startup(DependencyStartup::Concurrent)
            .build();

        let consumer = tokio::spawn({
            let graph = graph.clone();
            async move { graph.resolve::<Port>().await }
        });
        tokio::task::yield_now().await;

        graph.provide_value(Port(9000)).unwrap();
        let port = consumer.await.unwrap().unwrap();
        assert_eq!(*port, Port(9000));
    }

    #[tokio::test]
    async fn test_stop_waiting_fails_pending_consumers() {
        let graph = DependencyGraph::builder()
            .startup(DependencyStartup::Concurrent)
            .build();

        let consumer = tokio::spawn({
            let graph = graph.clone();
            async move { graph.resolve::<Port>().await }
        });
        tokio::task::yield_now().await;

        graph.stop_waiting();
        assert!(!graph.is_waiting());
        let error = consumer.await.unwrap().err().unwrap();
        assert!(error.is_missing(&DependencyKey::of::<Port>()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lookups_racing_stop_waiting_never_hang() {
        let graph = DependencyGraph::builder()
            .startup(DependencyStartup::Concurrent)
            .build();

        let consumers: Vec<_> = (0..64)
            .map(|index| {
                let graph = graph.clone();
                tokio::spawn(async move { graph.resolve_named::<Port>(&format!("port-{index}")).await })
            })
            .collect();
        graph.stop_waiting();

        for consumer in consumers {
            let outcome = tokio::time::timeout(Duration::from_secs(5), consumer)
                .await
                .expect("consumer hung after stop_waiting");
            assert!(matches!(outcome.unwrap(), Err(DependencyError::Missing(_))));
        }
    }

    #[tokio::test]
    async fn test_placeholder_created_after_stop_is_closed() {
        let graph = DependencyGraph::builder()
            .startup(DependencyStartup::Concurrent)
            .build();
        graph.stop_waiting();

        // A lookup that passed the `waiting` check before the sweep.
        let placeholder = graph.inner.placeholder(&DependencyKey::of::<Port>());
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            placeholder.resolve(&graph.resolver()),
        )
        .await
        .expect("placeholder left open after stop_waiting");
        assert!(outcome.err().unwrap().is_missing(&DependencyKey::of::<Port>()));
    }

    #[tokio::test]
    async fn test_sequential_startup_fails_immediately() {
        let graph = DependencyGraph::new();
        let error = graph.resolve::<Port>().await.err().unwrap();
        assert!(error.is_missing(&DependencyKey::of::<Port>()));
    }

    #[tokio::test]
    async fn test_duplicate_registration_faults() {
        let graph = DependencyGraph::new();
        graph.provide_value(1u32).unwrap();
        let error = graph.provide_value(2u32).unwrap_err();
        assert!(matches!(error, DependencyError::Duplicate(_)));

        // Named keys are distinct.
        graph.provide_named_value("other", 3u32).unwrap();
        assert_eq!(*graph.resolve_named::<u32>("other").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ignore_conflicts_replaces() {
        let graph = DependencyGraph::builder().conflict_policy(IgnoreConflicts).build();
        graph.provide_value(1u32).unwrap();
        graph.provide_value(2u32).unwrap();
        assert_eq!(*graph.resolve::<u32>().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replacing_started_provider_is_out_of_order() {
        let graph = DependencyGraph::builder().conflict_policy(IgnoreConflicts).build();
        graph.provide(|_| async { Ok(English) }).register().unwrap();
        graph.resolve::<English>().await.unwrap();

        let error = graph
            .provide(|_| async { Ok(English) })
            .register()
            .unwrap_err();
        assert!(matches!(error, DependencyError::OutOfOrder(_)));
    }

    #[tokio::test]
    async fn test_optional_resolution() {
        let graph = DependencyGraph::new();
        graph.provide_null::<Port>().unwrap();

        let resolver = graph.resolver();
        assert!(resolver.resolve_optional::<Port>().await.unwrap().is_none());
        assert!(resolver.resolve_optional::<English>().await.unwrap().is_none());
        assert!(graph.resolve::<Port>().await.is_err());
    }

    #[tokio::test]
    async fn test_validate_collects_every_failure() {
        let graph = DependencyGraph::new();
        graph.provide_value(Port(80)).unwrap();
        graph.require::<Port>();
        graph.require::<English>();
        graph.require::<French>();

        match graph.validate().await {
            Err(DependencyError::Validation(failures)) => {
                let keys: Vec<_> = failures.into_iter().map(|(key, _)| key).collect();
                assert_eq!(keys, vec![DependencyKey::of::<English>(), DependencyKey::of::<French>()]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_runs_hooks_newest_first() {
        struct First;
        struct Second;
        struct Unused;

        let order = Arc::new(Mutex::new(Vec::new()));
        let graph = DependencyGraph::new();

        let log = Arc::clone(&order);
        graph
            .provide(|_| async { Ok(First) })
            .on_shutdown(move |_| log.lock().unwrap().push("first"))
            .register()
            .unwrap();
        let log = Arc::clone(&order);
        graph
            .provide(|_| async { Ok(Second) })
            .on_shutdown(move |_| log.lock().unwrap().push("second"))
            .register()
            .unwrap();
        let log = Arc::clone(&order);
        graph
            .provide(|_| async { Ok(Unused) })
            .on_shutdown(move |_| log.lock().unwrap().push("unused"))
            .register()
            .unwrap();

        graph.resolve::<First>().await.unwrap();
        graph.resolve::<Second>().await.unwrap();

        assert_eq!(graph.shutdown(), 2);
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_included_maps_and_properties() {
        let properties = ConfigProperties::from_toml("[server]\nport = 8080\nname = \"edge\"").unwrap();
        let graph = DependencyGraph::builder()
            .include(ConfigurationDependencyMap::new(properties))
            .build();
        graph.include(MapDependencies::new().with(Port(1)));

        assert!(graph.contains(&DependencyKey::of::<Port>()));
        assert!(graph.contains(&DependencyKey::property("server.port")));
        assert_eq!(*graph.resolve::<Port>().await.unwrap(), Port(1));

        let resolver = graph.resolver();
        assert_eq!(resolver.property::<u16>("server.port").await.unwrap(), 8080);
        assert_eq!(resolver.property::<String>("server.name").await.unwrap(), "edge");
        assert!(matches!(
            resolver.property::<u16>("server.name").await,
            Err(DependencyError::Property { .. })
        ));
    }
}
