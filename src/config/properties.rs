//! Dotted-path access to application properties.

use serde::de::DeserializeOwned;

use crate::config::loader::ConfigError;

/// Read-only view of the `[properties]` table.
///
/// `get("db.pool.size")` walks nested tables; a missing segment yields `None`.
#[derive(Debug, Clone)]
pub struct ConfigProperties {
    root: toml::Value,
}

impl Default for ConfigProperties {
    fn default() -> Self {
        Self::from_table(toml::Table::new())
    }
}

impl ConfigProperties {
    pub fn from_table(table: toml::Table) -> Self {
        Self {
            root: toml::Value::Table(table),
        }
    }

    /// Parse a TOML document as the property root.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content)?;
        Ok(Self::from_table(table))
    }

    pub fn get(&self, path: &str) -> Option<&toml::Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.root, |value, segment| value.as_table()?.get(segment))
    }

    /// Decode the value at `path`; `Ok(None)` when absent.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, toml::de::Error> {
        self.get(path).cloned().map(T::deserialize).transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.root.as_table().map(|table| table.is_empty()).unwrap_or(true)
    }
}
