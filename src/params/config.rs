use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

const MODEL_BUILDERS_KEY: &str = "model_builders";

/// Shared configuration pool consulted by builders.
///
/// A nested, string-keyed mapping backed by a TOML table. Every key read
/// through [`get`](Config::get) is recorded so that keys nothing consumed can
/// be reported with [`unused_keys`](Config::unused_keys).
///
/// # Examples
///
/// ```
/// use equiforge::Config;
///
/// let config = Config::from_toml_str(r#"
///     model_builders = ["SimpleIrrepsConfig", "EnergyModel"]
///     r_max = 5.0
/// "#)?;
///
/// assert_eq!(config.model_builders()?, vec!["SimpleIrrepsConfig", "EnergyModel"]);
/// assert_eq!(config.get_as::<f64>("r_max")?, Some(5.0));
/// # Ok::<(), equiforge::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    table: toml::Table,
    consumed: RefCell<BTreeSet<String>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] if the text is not valid TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(text)?;
        Ok(Self::from(table))
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Returns the value under `key`, marking the key as consumed.
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        let value = self.table.get(key);
        if value.is_some() {
            self.mark_consumed(key);
        }
        value
    }

    /// Deserializes the value under `key` into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Type`] if the value has the wrong shape for `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| {
                value
                    .clone()
                    .try_into::<T>()
                    .map_err(|e| Error::Type(format!("config key `{}`: {}", key, e)))
            })
            .transpose()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<toml::Value>) {
        self.table.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<toml::Value> {
        self.table.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn table(&self) -> &toml::Table {
        &self.table
    }

    /// Ordered names of the model builders to run.
    ///
    /// A missing key yields an empty list.
    pub fn model_builders(&self) -> Result<Vec<String>> {
        Ok(self
            .get_as::<Vec<String>>(MODEL_BUILDERS_KEY)?
            .unwrap_or_default())
    }

    pub fn mark_consumed(&self, key: &str) {
        self.consumed.borrow_mut().insert(key.to_string());
    }

    /// Top-level keys that were never read.
    pub fn unused_keys(&self) -> Vec<String> {
        let consumed = self.consumed.borrow();
        self.table
            .keys()
            .filter(|k| !consumed.contains(k.as_str()))
            .cloned()
            .collect()
    }
}

impl From<toml::Table> for Config {
    fn from(table: toml::Table) -> Self {
        Self {
            table,
            consumed: RefCell::default(),
        }
    }
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_tables() {
        let config = Config::from_toml_str(
            r#"
            r_max = 4.0
            [irreps_in]
            node_features = "8x0e"
            "#,
        )
        .unwrap();
        assert!(config.contains_key("irreps_in"));
        assert!(config.get("irreps_in").unwrap().is_table());
    }

    #[test]
    fn errors_on_invalid_toml() {
        let result = Config::from_toml_str("not valid [[[toml");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn get_as_reports_type_errors() {
        let config = Config::from_toml_str(r#"num_types = "three""#).unwrap();
        let err = config.get_as::<usize>("num_types").unwrap_err();
        assert!(matches!(err, Error::Type(_)));
        assert_eq!(config.get_as::<usize>("absent").unwrap(), None);
    }

    #[test]
    fn model_builders_default_to_empty() {
        assert!(Config::new().model_builders().unwrap().is_empty());
    }

    #[test]
    fn model_builders_reject_non_strings() {
        let config = Config::from_toml_str("model_builders = [1, 2]").unwrap();
        assert!(matches!(config.model_builders(), Err(Error::Type(_))));
    }

    #[test]
    fn tracks_unused_keys() {
        let config = Config::from_toml_str("a = 1\nb = 2\nc = 3").unwrap();
        let _ = config.get("a");
        config.mark_consumed("c");
        assert_eq!(config.unused_keys(), vec!["b".to_string()]);
    }

    #[test]
    fn contains_key_does_not_consume() {
        let config = Config::from_toml_str("a = 1").unwrap();
        assert!(config.contains_key("a"));
        assert_eq!(config.unused_keys(), vec!["a".to_string()]);
    }

    #[test]
    fn insert_and_remove_round_trip() {
        let mut config = Config::new();
        config.insert("num_types", 3);
        assert_eq!(config.get_as::<i64>("num_types").unwrap(), Some(3));
        assert_eq!(config.remove("num_types"), Some(toml::Value::Integer(3)));
        assert!(!config.contains_key("num_types"));
    }
}
