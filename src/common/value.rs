use std::cmp::Ordering;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::common::document::Document;

/// Dynamically typed document value.
///
/// Equality and ordering follow one canonical total order: values of different
/// kinds sort by type bracket (`Missing`/`Null` < numbers < strings < documents <
/// arrays < booleans < dates), numbers compare by numeric value regardless of width.
#[derive(Debug, Clone)]
pub enum Value {
    Missing,
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Null or missing.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Missing | Value::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "missing",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Document(_) => "object",
        }
    }

    /// Numeric value widened to `f64`, `None` for non-numbers.
    pub fn coerce_to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Long(l) => Some(*l as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Smallest integral representation: `Int` when it fits in 32 bits, else `Long`.
    pub fn int_or_long(value: i64) -> Value {
        match i32::try_from(value) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Long(value),
        }
    }

    fn canonical_type(&self) -> u8 {
        match self {
            Value::Missing | Value::Null => 5,
            Value::Int(_) | Value::Long(_) | Value::Double(_) => 10,
            Value::String(_) => 15,
            Value::Document(_) => 20,
            Value::Array(_) => 25,
            Value::Bool(_) => 40,
            Value::Date(_) => 45,
        }
    }

    fn integral(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i as i64),
            Value::Long(l) => Some(*l),
            Value::Double(d) if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d < i64::MAX as f64 => {
                Some(*d as i64)
            }
            _ => None,
        }
    }

    /// Same type and same representation, recursively; stricter than `==`,
    /// which treats `Int(1)` and `Double(1.0)` as equal.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Missing, Value::Missing) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_identical(y))
            }
            (Value::Document(a), Value::Document(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.is_identical(vb))
            }
            _ => false,
        }
    }

    /// Total order over all values.
    pub fn compare(&self, other: &Value) -> Ordering {
        let by_type = self.canonical_type().cmp(&other.canonical_type());
        if by_type != Ordering::Equal {
            return by_type;
        }
        match (self, other) {
            (Value::Missing | Value::Null, Value::Missing | Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => compare_seq(a.iter(), b.iter()),
            (Value::Document(a), Value::Document(b)) => a.compare(b),
            (a, b) => compare_numbers(a, b),
        }
    }
}

fn compare_seq<'a>(
    mut a: impl Iterator<Item = &'a Value>,
    mut b: impl Iterator<Item = &'a Value>,
) -> Ordering {
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = x.compare(y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

// NaN sorts below every other number and equals itself.
fn compare_numbers(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (a.integral(), b.integral()) {
        return x.cmp(&y);
    }
    let x = a.coerce_to_f64().unwrap_or(f64::NAN);
    let y = b.coerce_to_f64().unwrap_or(f64::NAN);
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => OrderedFloat(x).cmp(&OrderedFloat(y)),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::int_or_long(i)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                if map.len() == 1 {
                    if let Some(millis) = map.get("$date").and_then(JsonValue::as_i64) {
                        return Value::Date(millis);
                    }
                }
                Value::Document(Document::from(map))
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Missing | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i32(*i),
            Value::Long(l) => serializer.serialize_i64(*l),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(millis) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$date", millis)?;
                map.end()
            }
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Document(doc) => doc.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Value::from)
    }
}
