//! Attribute maps: the serialized identity of inputs and the cache key/value
//! format.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, Result};

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attr {
    Bool(bool),
    Int(i64),
    String(String),
}

impl From<&str> for Attr {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Attr {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Attr {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Attr {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Ordered attribute map. Ordering is by key so that serialization is stable.
pub type Attrs = BTreeMap<String, Attr>;

/// Build an [`Attrs`] from `(key, value)` pairs.
pub fn attrs<K, V, I>(pairs: I) -> Attrs
where
    K: Into<String>,
    V: Into<Attr>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

pub fn maybe_get_str<'a>(attrs: &'a Attrs, name: &str) -> Result<Option<&'a str>> {
    match attrs.get(name) {
        None => Ok(None),
        Some(Attr::String(s)) => Ok(Some(s)),
        Some(_) => Err(type_error(name, "string")),
    }
}

pub fn get_str<'a>(attrs: &'a Attrs, name: &str) -> Result<&'a str> {
    maybe_get_str(attrs, name)?.ok_or_else(|| FetchError::MissingAttribute(name.to_string()))
}

pub fn maybe_get_int(attrs: &Attrs, name: &str) -> Result<Option<i64>> {
    match attrs.get(name) {
        None => Ok(None),
        Some(Attr::Int(i)) => Ok(Some(*i)),
        Some(_) => Err(type_error(name, "integer")),
    }
}

pub fn get_int(attrs: &Attrs, name: &str) -> Result<i64> {
    maybe_get_int(attrs, name)?.ok_or_else(|| FetchError::MissingAttribute(name.to_string()))
}

pub fn get_bool(attrs: &Attrs, name: &str) -> Result<bool> {
    match attrs.get(name) {
        None => Err(FetchError::MissingAttribute(name.to_string())),
        Some(Attr::Bool(b)) => Ok(*b),
        Some(_) => Err(type_error(name, "Boolean")),
    }
}

/// Canonical JSON text of an attribute map. Keys come out sorted, so equal
/// maps always produce equal text.
pub fn attrs_to_json(attrs: &Attrs) -> String {
    serde_json::to_string(attrs).unwrap_or_default()
}

pub fn attrs_from_json(text: &str) -> Result<Attrs> {
    Ok(serde_json::from_str(text)?)
}

fn type_error(name: &str, expected: &'static str) -> FetchError {
    FetchError::AttributeType {
        name: name.to_string(),
        expected,
    }
}
