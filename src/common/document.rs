use std::cmp::Ordering;

use anyhow::{anyhow, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::common::value::Value;

static MISSING: Value = Value::Missing;

/// Ordered field-name to value mapping.
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Value of a top-level field, `Value::Missing` when absent.
    pub fn get(&self, name: &str) -> &Value {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
            .unwrap_or(&MISSING)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(field, _)| field == name)
    }

    /// Replaces an existing field in place, appends a new one otherwise.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Builds a document from a JSON object.
    pub fn from_json(json: JsonValue) -> Result<Self> {
        match json {
            JsonValue::Object(map) => Ok(Document::from(map)),
            other => Err(anyhow!("expected a JSON object for a document, got {}", other)),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<JsonValue> {
        serde_json::to_value(self)
    }

    pub(crate) fn compare(&self, other: &Document) -> Ordering {
        let mut left = self.iter();
        let mut right = other.iter();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some((ln, lv)), Some((rn, rv))) => {
                    let ord = lv.compare(rv).then_with(|| ln.cmp(rn));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
            }
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl From<Map<String, JsonValue>> for Document {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self {
            fields: map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.set(name, value);
        }
        doc
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let present = self.fields.iter().filter(|(_, v)| !v.is_missing());
        let mut map = serializer.serialize_map(Some(present.clone().count()))?;
        for (name, value) in present {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Map::<String, JsonValue>::deserialize(deserializer)?;
        Ok(Document::from(map))
    }
}
