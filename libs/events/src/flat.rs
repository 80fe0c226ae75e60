//! Flat, JSON-compatible output values.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A flattened value: a nested record, a string, or null.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FlatValue {
    #[default]
    Null,
    Text(String),
    Record(FlatRecord),
}

impl FlatValue {
    /// Returns true for values that are dropped from a parent record:
    /// null, the empty string and the empty record.
    pub fn is_empty(&self) -> bool {
        match self {
            FlatValue::Null => true,
            FlatValue::Text(s) => s.is_empty(),
            FlatValue::Record(r) => r.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FlatValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&FlatRecord> {
        match self {
            FlatValue::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl From<&str> for FlatValue {
    fn from(value: &str) -> Self {
        FlatValue::Text(value.to_string())
    }
}

impl From<String> for FlatValue {
    fn from(value: String) -> Self {
        FlatValue::Text(value)
    }
}

impl From<FlatRecord> for FlatValue {
    fn from(value: FlatRecord) -> Self {
        FlatValue::Record(value)
    }
}

impl Serialize for FlatValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FlatValue::Null => serializer.serialize_unit(),
            FlatValue::Text(s) => serializer.serialize_str(s),
            FlatValue::Record(r) => r.serialize(serializer),
        }
    }
}

/// An insertion-ordered string-keyed record.
///
/// Keys are unique; inserting an existing key replaces the value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlatRecord {
    entries: Vec<(String, FlatValue)>,
}

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FlatValue>) -> Option<FlatValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FlatValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlatValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
