//! Dependency keys.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

/// Extra discriminator beyond type and name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualifier {
    /// The name is a dotted configuration path.
    Property,
}

/// Identifies a dependency by type, optional name and optional qualifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DependencyKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<Arc<str>>,
    qualifier: Option<Qualifier>,
}

impl DependencyKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: None,
            qualifier: None,
        }
    }

    pub fn named<T: ?Sized + 'static>(name: impl AsRef<str>) -> Self {
        Self::of::<T>().with_name(name)
    }

    /// Key of a raw configuration value at `path`.
    pub fn property(path: impl AsRef<str>) -> Self {
        Self {
            qualifier: Some(Qualifier::Property),
            ..Self::named::<toml::Value>(path)
        }
    }

    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Some(Arc::from(name.as_ref()));
        self
    }

    /// Same name and qualifier, different type.
    pub(crate) fn retyped<U: ?Sized + 'static>(&self) -> Self {
        Self {
            type_id: TypeId::of::<U>(),
            type_name: type_name::<U>(),
            name: self.name.clone(),
            qualifier: self.qualifier,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn qualifier(&self) -> Option<Qualifier> {
        self.qualifier
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.qualifier, &self.name) {
            (Some(Qualifier::Property), Some(name)) => write!(f, "property(\"{}\")", name),
            (_, Some(name)) => write!(f, "{}(\"{}\")", self.type_name, name),
            (_, None) => f.write_str(self.type_name),
        }
    }
}

impl fmt::Debug for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DependencyKey({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Store {}

    #[test]
    fn test_key_equality() {
        assert_eq!(DependencyKey::of::<String>(), DependencyKey::of::<String>());
        assert_ne!(DependencyKey::of::<String>(), DependencyKey::named::<String>("a"));
        assert_ne!(DependencyKey::of::<String>(), DependencyKey::of::<u32>());
        assert_eq!(
            DependencyKey::named::<u8>("x").retyped::<dyn Store>(),
            DependencyKey::named::<dyn Store>("x")
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(DependencyKey::named::<u32>("port").to_string(), "u32(\"port\")");
        assert_eq!(DependencyKey::property("db.url").to_string(), "property(\"db.url\")");
        assert_ne!(DependencyKey::property("a"), DependencyKey::named::<toml::Value>("a"));
    }
}
