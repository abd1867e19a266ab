use crate::error::BrowseError;
use compact_str::CompactString;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Declared kind of a payload column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "int")]
    Integer,
    #[serde(rename = "float")]
    Float,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ColumnKind::Text)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "int",
            ColumnKind::Float => "float",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Text(CompactString),
    Integer(i64),
    Float(f64),
    Null,
}

impl Value {
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) => 1,
            Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::Null => "null",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Text rendering used for substring search and delimited exports.
    pub fn display_text(&self) -> String {
        match self {
            Value::Text(s) => s.to_string(),
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Null => String::new(),
        }
    }

    /// Typed view of a raw payload value under `kind`.
    ///
    /// Text stored for numeric columns is parsed; blank text becomes `Null`. A numeric
    /// value is never turned into text, and anything that does not fit the kind is
    /// rejected instead of coerced.
    pub fn cast(&self, kind: ColumnKind, column: &str) -> Result<Value, BrowseError> {
        let mismatch = || {
            BrowseError::invalid(format!(
                "column '{column}' declared {kind} holds {} value '{}'",
                self.type_name(),
                self.display_text()
            ))
        };
        match (kind, self) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnKind::Text, Value::Text(_)) => Ok(self.clone()),
            (ColumnKind::Text, _) => Err(mismatch()),
            (ColumnKind::Integer, Value::Integer(_)) => Ok(self.clone()),
            (ColumnKind::Integer, Value::Float(f)) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Ok(Value::Integer(*f as i64))
                } else {
                    Err(mismatch())
                }
            }
            (ColumnKind::Integer, Value::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(Value::Null);
                }
                trimmed
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| mismatch())
            }
            (ColumnKind::Float, Value::Integer(v)) => Ok(Value::Float(*v as f64)),
            (ColumnKind::Float, Value::Float(_)) => Ok(self.clone()),
            (ColumnKind::Float, Value::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(Value::Null);
                }
                match trimmed.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(Value::Float(v)),
                    _ => Err(mismatch()),
                }
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
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
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

// Values travel untagged: the grid reads plain JSON scalars.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Text(s) => serializer.serialize_str(s),
            Value::Integer(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Null => serializer.serialize_none(),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, a number or null")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v)
            .map(Value::Integer)
            .unwrap_or(Value::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Text(v.into()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Text(v.into()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Open-ended per-record field map, keyed by column code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, code: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(code.into(), value.into());
        self
    }

    pub fn insert(&mut self, code: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(code.into(), value)
    }

    /// Raw value for `code`; absent fields read as `Null`.
    pub fn get(&self, code: &str) -> &Value {
        self.0.get(code).unwrap_or(&Value::Null)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains_key(code)
    }

    pub fn cast(&self, code: &str, kind: ColumnKind) -> Result<Value, BrowseError> {
        self.get(code).cast(kind, code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Payload {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
