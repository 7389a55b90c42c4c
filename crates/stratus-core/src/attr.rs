//! Typed attribute tree
//!
//! Resource attributes are addressed by dotted path (e.g.
//! `ProvisionedThroughput.ReadCapacityUnits`) and hold typed scalars or
//! lists of nested maps for composite fields such as key schemas and tag
//! lists. Paths are kept in a `BTreeMap` so iteration order is stable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered mapping from dotted attribute path to value.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A single attribute value.
///
/// Variant order matters for untagged deserialization: booleans and
/// integers must be tried before strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
    /// Composite list field (key schema, attribute definitions, tags).
    List(Vec<AttrMap>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttrMap]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(n) => write!(f, "{}", n),
            AttrValue::Str(s) => write!(f, "{}", s),
            AttrValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let fields: Vec<String> =
                        item.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    write!(f, "{{{}}}", fields.join(" "))?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Int(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// Build one entry of a `Tags` list.
pub fn tag_entry(key: &str, value: &str) -> AttrMap {
    let mut entry = AttrMap::new();
    entry.insert("Key".to_string(), AttrValue::from(key));
    entry.insert("Value".to_string(), AttrValue::from(value));
    entry
}

/// Tag key of a `Tags` list entry, if well-formed.
pub fn tag_key(entry: &AttrMap) -> Option<&str> {
    entry.get("Key").and_then(AttrValue::as_str)
}

/// Tag value of a `Tags` list entry, if well-formed.
pub fn tag_value(entry: &AttrMap) -> Option<&str> {
    entry.get("Value").and_then(AttrValue::as_str)
}
