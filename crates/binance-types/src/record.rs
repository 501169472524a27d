//! Canonical record shapes
//!
//! Exchange payloads are collapsed into string-valued maps keyed by the
//! exchange's own field names, instead of one struct per stream.

use crate::error::{BinanceError, BinanceResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::hash_map::{HashMap, Iter};
use std::str::FromStr;

/// Convert any JSON value to its record string form
///
/// Strings are taken verbatim; every other value uses its compact JSON text
/// (`1.5`, `true`, `null`, `{"a":1}`).
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A single logical event: field key to field value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRecord(HashMap<String, String>);

impl FlatRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from every field of a JSON object
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self(
            object
                .iter()
                .map(|(key, value)| (key.clone(), stringify(value)))
                .collect(),
        )
    }

    /// Build a record from a JSON value that must be an object
    pub fn from_value(value: &Value) -> BinanceResult<Self> {
        value
            .as_object()
            .map(Self::from_object)
            .ok_or_else(|| BinanceError::protocol("expected a JSON object", Some(&value.to_string())))
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Get a field parsed as a decimal (prices, quantities)
    pub fn decimal(&self, key: &str) -> Option<Decimal> {
        self.get(key).and_then(|v| Decimal::from_str(v).ok())
    }

    /// Parse a field holding a stringified JSON object (e.g. the `k` field
    /// of a kline frame) back into a record
    pub fn nested(&self, key: &str) -> Option<FlatRecord> {
        match serde_json::from_str::<Value>(self.get(key)?) {
            Ok(Value::Object(object)) => Some(Self::from_object(&object)),
            _ => None,
        }
    }

    /// Insert or replace a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Check if a field is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields
    pub fn iter(&self) -> Iter<'_, String, String> {
        self.0.iter()
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlatRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<HashMap<String, String>> for FlatRecord {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

/// A batch of per-entity snapshots keyed by an outer key (usually the symbol)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyedRecord(HashMap<String, FlatRecord>);

impl KeyedRecord {
    /// Create an empty keyed record
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a keyed record from an array of objects
    ///
    /// Each element is keyed by the string form of its `key_field`. An
    /// element that is not an object or lacks the key is a protocol error.
    pub fn from_objects(elements: &[Value], key_field: &str) -> BinanceResult<Self> {
        let mut keyed = Self::new();
        for element in elements {
            let object = element.as_object().ok_or_else(|| {
                BinanceError::protocol("array element is not an object", Some(&element.to_string()))
            })?;
            let key = object.get(key_field).ok_or_else(|| {
                BinanceError::protocol(
                    format!("array element missing key field '{}'", key_field),
                    Some(&element.to_string()),
                )
            })?;
            keyed.insert(stringify(key), FlatRecord::from_object(object));
        }
        Ok(keyed)
    }

    /// Get the record for an outer key
    pub fn get(&self, key: &str) -> Option<&FlatRecord> {
        self.0.get(key)
    }

    /// Insert or replace the record for an outer key
    pub fn insert(&mut self, key: impl Into<String>, record: FlatRecord) {
        self.0.insert(key.into(), record);
    }

    /// Outer keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of outer keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries
    pub fn iter(&self) -> Iter<'_, String, FlatRecord> {
        self.0.iter()
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> HashMap<String, FlatRecord> {
        self.0
    }
}

impl<K: Into<String>> FromIterator<(K, FlatRecord)> for KeyedRecord {
    fn from_iter<I: IntoIterator<Item = (K, FlatRecord)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
