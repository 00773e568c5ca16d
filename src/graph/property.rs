//! Attribute values attached to network nodes and edges
//!
//! Attributes are what the exchange formats carry; the typed records remain
//! the source of truth.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute value supporting the types GraphML can declare
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// GraphML `attr.type` for this value. Lists are exported as strings.
    pub fn graphml_type(&self) -> &'static str {
        match self {
            PropertyValue::String(_) | PropertyValue::List(_) => "string",
            PropertyValue::Integer(_) => "long",
            PropertyValue::Float(_) => "double",
            PropertyValue::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Float(fl) => write!(f, "{}", fl),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::List(items) => {
                for (i, val) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ";")?;
                    }
                    write!(f, "{}", val)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&PropertyValue> for serde_json::Value {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::String(s) => serde_json::Value::String(s.clone()),
            PropertyValue::Integer(i) => serde_json::Value::from(*i),
            PropertyValue::Float(f) => serde_json::Value::from(*f),
            PropertyValue::Boolean(b) => serde_json::Value::Bool(*b),
            PropertyValue::List(items) => serde_json::Value::Array(items.iter().map(Into::into).collect()),
        }
    }
}

// Convenience conversions
impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

impl From<i32> for PropertyValue {
    fn from(i: i32) -> Self {
        PropertyValue::Integer(i as i64)
    }
}

impl From<usize> for PropertyValue {
    fn from(i: usize) -> Self {
        PropertyValue::Integer(i as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        PropertyValue::Float(f)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(items: Vec<T>) -> Self {
        PropertyValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Ordered attribute map, so exports are byte-stable
pub type PropertyMap = BTreeMap<String, PropertyValue>;
