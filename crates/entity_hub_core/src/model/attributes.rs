//! Per-entity attribute set built from a type schema.
//!
//! # Responsibility
//! - Hold one `AttributeValue` per schema key.
//! - Report only dirty keys for minimal update payloads.
//!
//! # Invariants
//! - The key set is fixed at construction; unknown keys are rejected on
//!   both read and write.
//! - Values are compared with exact JSON equality.

use crate::model::tracked::Tracked;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One versioned attribute value.
pub type AttributeValue = Tracked<Value>;

/// Attribute access errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    /// Key is not part of the entity type schema.
    UnknownKey(String),
}

impl Display for AttributeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKey(key) => write!(f, "unknown attribute `{key}`"),
        }
    }
}

impl Error for AttributeError {}

/// Fixed-key attribute mapping of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    values: BTreeMap<String, AttributeValue>,
}

impl Attributes {
    /// Builds attributes for `keys`, taking initial values from `values`.
    ///
    /// Values under keys outside the schema are ignored. Keys without a
    /// value start as `null`.
    pub fn new<I, S>(keys: I, values: Option<&Map<String, Value>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = keys
            .into_iter()
            .map(Into::into)
            .map(|key| {
                let initial = values
                    .and_then(|values| values.get(&key))
                    .cloned()
                    .unwrap_or(Value::Null);
                (key, AttributeValue::new(initial))
            })
            .collect();
        Self { values }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values
            .iter()
            .map(|(key, attribute)| (key.as_str(), attribute.value()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the current value of `key`.
    pub fn get(&self, key: &str) -> Result<&Value, AttributeError> {
        self.attribute(key).map(AttributeValue::value)
    }

    /// Changes the current value of `key`.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<(), AttributeError> {
        let attribute = self
            .values
            .get_mut(key)
            .ok_or_else(|| AttributeError::UnknownKey(key.to_string()))?;
        attribute.set_value(value.into());
        Ok(())
    }

    /// Access to the versioned value object of `key`.
    pub fn attribute(&self, key: &str) -> Result<&AttributeValue, AttributeError> {
        self.values
            .get(key)
            .ok_or_else(|| AttributeError::UnknownKey(key.to_string()))
    }

    /// Dirty keys mapped to their current value.
    pub fn changes(&self) -> Map<String, Value> {
        self.values
            .iter()
            .filter(|(_, attribute)| attribute.changed())
            .map(|(key, attribute)| (key.clone(), attribute.value().clone()))
            .collect()
    }

    /// All values, optionally without `null` ones.
    pub fn to_map(&self, ignore_null: bool) -> Map<String, Value> {
        self.values
            .iter()
            .filter(|(_, attribute)| !ignore_null || !attribute.value().is_null())
            .map(|(key, attribute)| (key.clone(), attribute.value().clone()))
            .collect()
    }

    pub fn lock(&mut self) {
        for attribute in self.values.values_mut() {
            attribute.lock();
        }
    }
}
