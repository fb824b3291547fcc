//! Nested per-entity records produced by result reshaping.

use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// One slot of a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entry {
    /// A scalar column value.
    Value(Value),
    /// A single nested record (joined table, to-one association).
    One(Record),
    /// A list of nested records (to-many association).
    Many(Vec<Record>),
}

impl Entry {
    /// Get the scalar value, if this entry holds one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Entry::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Get the nested record, if this entry holds one.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Entry::One(r) => Some(r),
            _ => None,
        }
    }

    /// Get the nested record list, if this entry holds one.
    pub fn as_many(&self) -> Option<&[Record]> {
        match self {
            Entry::Many(rs) => Some(rs),
            _ => None,
        }
    }

    /// Convert to plain JSON (no enum tags on values).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Entry::Value(v) => value_to_json(v),
            Entry::One(r) => r.to_json(),
            Entry::Many(rs) => serde_json::Value::Array(rs.iter().map(Record::to_json).collect()),
        }
    }
}

impl From<Value> for Entry {
    fn from(v: Value) -> Self {
        Entry::Value(v)
    }
}

impl From<Record> for Entry {
    fn from(r: Record) -> Self {
        Entry::One(r)
    }
}

impl From<Vec<Record>> for Entry {
    fn from(rs: Vec<Record>) -> Self {
        Entry::Many(rs)
    }
}

macro_rules! entry_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Entry {
                fn from(v: $t) -> Self {
                    Entry::Value(Value::from(v))
                }
            }
        )*
    };
}

entry_from_scalar!(bool, i32, i64, f64, &str, String);

/// A nested map keyed by table alias, field name or association property.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Entry>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous one under the key.
    pub fn insert(&mut self, key: impl Into<String>, entry: impl Into<Entry>) {
        self.fields.insert(key.into(), entry.into());
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, entry: impl Into<Entry>) -> Self {
        self.insert(key, entry);
        self
    }

    /// Get an entry by key.
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.fields.get(key)
    }

    /// Get a scalar value by key.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(Entry::as_value)
    }

    /// Get a nested record by key.
    pub fn record(&self, key: &str) -> Option<&Record> {
        self.get(key).and_then(Entry::as_record)
    }

    /// Get a nested record list by key.
    pub fn many(&self, key: &str) -> Option<&[Record]> {
        self.get(key).and_then(Entry::as_many)
    }

    /// Get (or create) the nested record under `key`.
    ///
    /// `None` when the key already holds a value or a list.
    pub fn record_mut(&mut self, key: &str) -> Option<&mut Record> {
        match self
            .fields
            .entry(key.to_string())
            .or_insert_with(|| Entry::One(Record::new()))
        {
            Entry::One(record) => Some(record),
            Entry::Value(_) | Entry::Many(_) => None,
        }
    }

    /// Check if a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no keys.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over top-level keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate over `(key, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flatten a reshaped row into an entity record.
    ///
    /// The fields of `base_alias` move to the top level; every other
    /// table or association key stays nested under its own name.
    pub fn into_entity(mut self, base_alias: &str) -> Record {
        let mut entity = match self.fields.remove(base_alias) {
            Some(Entry::One(base)) => base,
            Some(other) => Record::new().with(base_alias, other),
            None => Record::new(),
        };
        for (key, entry) in self.fields {
            entity.fields.insert(key, entry);
        }
        entity
    }

    /// Convert to plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Entry>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => value
            .as_i64()
            .map_or(serde_json::Value::Null, serde_json::Value::from),
        Value::Float(_) | Value::Double(_) => value
            .as_f64()
            .map_or(serde_json::Value::Null, serde_json::Value::from),
        Value::Decimal(s) | Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Json(j) => j.clone(),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        other => serde_json::Value::String(other.to_string()),
    }
}
