// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Argument value type system
//!
//! Every argument, query and default spec that takes part in cache-key
//! derivation is expressed as a [`Value`]:
//! - Scalars: Number, Bool
//! - Text
//! - Collections: List (heterogeneous), Map (named fields)
//! - Markers: Absent (the ignore sentinel) and Opaque (an unconverted object)
//!
//! Results returned by computations are stored as `Vec<Value>` as well.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MemoError, MemoResult};

/// Value types for computation arguments, default specs and results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
    List(Vec<Value>),
    Map(Fields),
    /// Ignore sentinel. Only meaningful inside a default spec: the matching
    /// argument never contributes to the cache key.
    Absent,
    /// A user object that was never converted into a field mapping.
    Opaque { type_name: String },
}

/// Named fields of a [`Value::Map`]
///
/// Insertion order is kept for rendering; equality only looks at which
/// field names map to which values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, keeping the original position on replace
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Fields {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Explicit conversion of a user type into named fields
///
/// Implement this for composite argument types that should take part in
/// cache-key derivation field by field.
pub trait ToFields {
    fn to_fields(&self) -> Fields;
}

impl Value {
    /// Build a map value from any [`ToFields`] implementor
    pub fn from_fields<T: ToFields + ?Sized>(object: &T) -> Self {
        Value::Map(object.to_fields())
    }

    /// Convert any serde-serializable value into its structural form
    ///
    /// Structs and maps become `Map`, sequences and tuples become `List`,
    /// unit/`None` becomes an empty list.
    pub fn from_serialize<T: Serialize + ?Sized>(object: &T) -> MemoResult<Self> {
        let json = serde_json::to_value(object)
            .map_err(|e| MemoError::Identity(format!("cannot convert value: {}", e)))?;
        Ok(Value::from(json))
    }

    /// Placeholder for an object that has not been converted yet
    pub fn opaque<T: ?Sized>() -> Self {
        Value::Opaque {
            type_name: std::any::type_name::<T>().to_string(),
        }
    }

    /// Convert a loaded value back into a typed value
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> MemoResult<T> {
        let json = self.to_json()?;
        serde_json::from_value(json)
            .map_err(|e| MemoError::Identity(format!("cannot convert {}: {}", self.type_name(), e)))
    }

    fn to_json(&self) -> MemoResult<serde_json::Value> {
        Ok(match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<MemoResult<Vec<_>>>()?,
            ),
            Value::Map(fields) => {
                let mut object = serde_json::Map::new();
                for (name, value) in fields.iter() {
                    object.insert(name.to_string(), value.to_json()?);
                }
                serde_json::Value::Object(object)
            }
            Value::Absent => serde_json::Value::Null,
            Value::Opaque { type_name } => {
                return Err(MemoError::Identity(format!(
                    "opaque {} has no structural form",
                    type_name
                )))
            }
        })
    }

    /// Extract as number if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract as text if possible
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Extract as boolean if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract as list if possible
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Extract as field map if possible
    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Bool(_) => "Bool",
            Value::Text(_) => "Text",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Absent => "Absent",
            Value::Opaque { .. } => "Opaque",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Absent => write!(f, "<absent>"),
            Value::Opaque { type_name } => write!(f, "<opaque {}>", type_name),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::List(Vec::new()),
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(object) => {
                Value::Map(object.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Value::Map(fields)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Window {
        start: i64,
        label: String,
        weights: Vec<f64>,
    }

    #[test]
    fn test_field_equality_ignores_order() {
        let a = Fields::new().with("x", 1).with("y", "two");
        let b = Fields::new().with("y", "two").with("x", 1);
        assert_eq!(a, b);
        assert_eq!(Value::Map(a.clone()), Value::Map(b));

        let c = Fields::new().with("x", 1);
        assert_ne!(a, c);
    }

    #[test]
    fn test_field_insert_replaces_in_place() {
        let mut fields = Fields::new().with("a", 1).with("b", 2);
        fields.insert("a", 10);
        let names: Vec<&str> = fields.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(fields.get("a"), Some(&Value::Number(10.0)));
    }

    #[test]
    fn test_from_serialize_struct() {
        let window = Window {
            start: 3,
            label: "early trials".to_string(),
            weights: vec![0.5, 0.25],
        };
        let value = Value::from_serialize(&window).unwrap();
        let fields = value.as_map().unwrap();
        assert_eq!(fields.get("start"), Some(&Value::Number(3.0)));
        assert_eq!(
            fields.get("weights"),
            Some(&Value::List(vec![Value::Number(0.5), Value::Number(0.25)]))
        );

        let back: Window = value.deserialize_into().unwrap();
        assert_eq!(back, window);
    }

    #[test]
    fn test_opaque_cannot_deserialize() {
        let value = Value::opaque::<std::fs::File>();
        assert_eq!(value.type_name(), "Opaque");
        let result: MemoResult<i32> = value.deserialize_into();
        assert!(matches!(result, Err(MemoError::Identity(_))));
    }

    #[test]
    fn test_to_fields() {
        struct Session {
            subject: String,
            day: u32,
        }

        impl ToFields for Session {
            fn to_fields(&self) -> Fields {
                Fields::new()
                    .with("subject", self.subject.as_str())
                    .with("day", self.day)
            }
        }

        let value = Value::from_fields(&Session {
            subject: "m12".to_string(),
            day: 4,
        });
        assert_eq!(
            value.as_map().and_then(|f| f.get("day")),
            Some(&Value::Number(4.0))
        );
    }

    #[test]
    fn test_display() {
        let value = Value::from(vec![Value::from(1), Value::from("a")]);
        assert_eq!(value.to_string(), "[1, \"a\"]");
    }
}
