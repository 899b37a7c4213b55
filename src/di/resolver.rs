//! Resolution handle passed to initializers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::di::error::DependencyError;
use crate::di::graph::GraphInner;
use crate::di::initializer::{downcast, Initializer, Instance};
use crate::di::key::DependencyKey;
use crate::observability::metrics;

/// Resolves dependencies from a graph, tracking the keys currently being
/// initialized along this chain so that cycles fail instead of hanging.
#[derive(Clone)]
pub struct DependencyResolver {
    graph: Arc<GraphInner>,
    chain: Vec<DependencyKey>,
}

impl DependencyResolver {
    pub(crate) fn new(graph: Arc<GraphInner>) -> Self {
        Self {
            graph,
            chain: Vec::new(),
        }
    }

    /// A resolver for the body of `key`'s initializer.
    pub(crate) fn enter(&self, key: &DependencyKey) -> Result<Self, DependencyError> {
        if let Some(start) = self.chain.iter().position(|active| active == key) {
            let mut cycle = self.chain[start..].to_vec();
            cycle.push(key.clone());
            return Err(DependencyError::Circular(cycle));
        }
        let mut chain = self.chain.clone();
        chain.push(key.clone());
        Ok(Self {
            graph: Arc::clone(&self.graph),
            chain,
        })
    }

    pub(crate) fn graph(&self) -> &Arc<GraphInner> {
        &self.graph
    }

    /// Keys being initialized along this chain, outermost first.
    pub fn chain(&self) -> &[DependencyKey] {
        &self.chain
    }

    pub async fn resolve<T>(&self) -> Result<Arc<T>, DependencyError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get(&DependencyKey::of::<T>()).await
    }

    pub async fn resolve_named<T>(&self, name: &str) -> Result<Arc<T>, DependencyError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get(&DependencyKey::named::<T>(name)).await
    }

    /// `None` when nothing is registered for `T`.
    pub async fn resolve_optional<T>(&self) -> Result<Option<Arc<T>>, DependencyError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = DependencyKey::of::<T>();
        let initializer = self.graph.lookup(&key, true)?;
        match initializer.resolve(self).await {
            Ok(instance) => downcast(&key, &instance).map(Some),
            Err(error) if error.is_missing(&key) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Resolve `T`, picking the single candidate whose origin key satisfies
    /// `predicate` when the key is ambiguous.
    pub async fn resolve_where<T, P>(&self, predicate: P) -> Result<Arc<T>, DependencyError>
    where
        T: ?Sized + Send + Sync + 'static,
        P: Fn(&DependencyKey) -> bool + Send,
    {
        let key = DependencyKey::of::<T>();
        let initializer = match self.graph.lookup(&key, false)? {
            Initializer::Ambiguous { key: ambiguous, candidates, distance } => {
                let chosen = {
                    let mut matching = candidates
                        .iter()
                        .filter(|candidate| predicate(&candidate.origin_key(&ambiguous)));
                    match (matching.next(), matching.next()) {
                        (Some(single), None) => Some(single.clone()),
                        _ => None,
                    }
                };
                chosen.unwrap_or(Initializer::Ambiguous {
                    key: ambiguous,
                    distance,
                    candidates,
                })
            }
            other => other,
        };
        let instance = initializer.resolve(self).await?;
        downcast(&key, &instance)
    }

    /// Decode the configuration property at dotted `path`.
    pub async fn property<T: DeserializeOwned>(&self, path: &str) -> Result<T, DependencyError> {
        let value = self.get::<toml::Value>(&DependencyKey::property(path)).await?;
        T::deserialize(value.as_ref().clone()).map_err(|err| DependencyError::Property {
            path: path.to_string(),
            reason: err.to_string(),
        })
    }

    pub async fn get<T>(&self, key: &DependencyKey) -> Result<Arc<T>, DependencyError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let instance = self.get_instance(key).await?;
        downcast(key, &instance)
    }

    /// Resolve `key` without downcasting.
    pub fn get_instance(
        &self,
        key: &DependencyKey,
    ) -> impl Future<Output = Result<Instance, DependencyError>> + Send + 'static {
        let pending = self
            .graph
            .lookup(key, false)
            .map(|initializer| initializer.resolve(self));
        let key = key.clone();

        async move {
            let result = match pending {
                Ok(future) => future.await,
                Err(error) => Err(error),
            };
            match &result {
                Ok(_) => metrics::record_dependency_resolution("success"),
                Err(error) => {
                    tracing::debug!(dependency = %key, error = %error, "Dependency resolution failed");
                    metrics::record_dependency_resolution("failure");
                }
            }
            result
        }
    }
}

impl fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("chain", &self.chain)
            .finish()
    }
}
