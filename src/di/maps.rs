//! External dependency sources consulted after declared providers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::properties::ConfigProperties;
use crate::di::error::DependencyError;
use crate::di::initializer::{instance, Instance};
use crate::di::key::{DependencyKey, Qualifier};

/// A read-only source of dependency values.
pub trait DependencyMap: Send + Sync + fmt::Debug {
    fn contains(&self, key: &DependencyKey) -> bool;

    fn get_instance(&self, key: &DependencyKey) -> Result<Instance, DependencyError>;
}

/// Fixed values keyed by type and name.
#[derive(Clone, Default)]
pub struct MapDependencies {
    values: HashMap<DependencyKey, Instance>,
}

impl MapDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.with_arc(DependencyKey::of::<T>(), Arc::new(value))
    }

    pub fn with_named<T: Send + Sync + 'static>(self, name: &str, value: T) -> Self {
        self.with_arc(DependencyKey::named::<T>(name), Arc::new(value))
    }

    /// Store an already shared value, possibly unsized (`Arc<dyn Trait>`).
    pub fn with_arc<T: ?Sized + Send + Sync + 'static>(mut self, key: DependencyKey, value: Arc<T>) -> Self {
        self.values.insert(key, instance(value));
        self
    }
}

impl DependencyMap for MapDependencies {
    fn contains(&self, key: &DependencyKey) -> bool {
        self.values.contains_key(key)
    }

    fn get_instance(&self, key: &DependencyKey) -> Result<Instance, DependencyError> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| DependencyError::Missing(key.clone()))
    }
}

impl fmt::Debug for MapDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Serves [`DependencyKey::property`] keys from configuration properties.
#[derive(Debug, Clone)]
pub struct ConfigurationDependencyMap {
    properties: ConfigProperties,
}

impl ConfigurationDependencyMap {
    pub fn new(properties: ConfigProperties) -> Self {
        Self { properties }
    }

    fn path<'k>(&self, key: &'k DependencyKey) -> Option<&'k str> {
        match key.qualifier() {
            Some(Qualifier::Property) => key.name(),
            None => None,
        }
    }
}

impl DependencyMap for ConfigurationDependencyMap {
    fn contains(&self, key: &DependencyKey) -> bool {
        self.path(key)
            .map(|path| self.properties.get(path).is_some())
            .unwrap_or(false)
    }

    fn get_instance(&self, key: &DependencyKey) -> Result<Instance, DependencyError> {
        self.path(key)
            .and_then(|path| self.properties.get(path))
            .map(|value| instance(Arc::new(value.clone())))
            .ok_or_else(|| DependencyError::Missing(key.clone()))
    }
}
