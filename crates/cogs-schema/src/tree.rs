//! The normalized document tree shared by every source format.
//!
//! JSON, TOML and dotenv documents are converted into the same
//! [`serde_yaml::Value`] representation that YAML parses into, so that path
//! queries and decoding only ever deal with one tree shape.

use crate::format::Format;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub use serde_yaml::{Mapping, Value};

/// A decoded key/value map with string keys.
pub type FlatMap = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("failed to parse {format} document: {message}")]
    Parse { format: Format, message: String },
    #[error("mapping key of kind {0} cannot be used as a variable name")]
    NonScalarKey(NodeKind),
}

/// Structural kind of a tree node, as reported in kind-mismatch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Mapping,
    Sequence,
    Scalar,
    Tagged,
}

impl NodeKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Mapping(_) => Self::Mapping,
            Value::Sequence(_) => Self::Sequence,
            Value::Tagged(_) => Self::Tagged,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Self::Scalar,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Document => "DocumentNode",
            Self::Mapping => "MappingNode",
            Self::Sequence => "SequenceNode",
            Self::Scalar => "ScalarNode",
            Self::Tagged => "TaggedNode",
        };
        f.write_str(s)
    }
}

/// Parse a document of the given format into the normalized tree.
///
/// Documents of unknown format are parsed as YAML, which also accepts JSON.
pub fn parse(format: Format, bytes: &[u8]) -> Result<Value, TreeError> {
    match format {
        Format::Json => parse_json(bytes),
        Format::Toml => parse_toml(bytes),
        Format::Dotenv => parse_dotenv(bytes),
        Format::Yaml | Format::Raw => parse_yaml(bytes),
    }
}

pub fn parse_yaml(bytes: &[u8]) -> Result<Value, TreeError> {
    serde_yaml::from_slice(bytes).map_err(|e| parse_error(Format::Yaml, e))
}

pub fn parse_json(bytes: &[u8]) -> Result<Value, TreeError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| parse_error(Format::Json, e))?;
    Ok(from_json(value))
}

pub fn parse_toml(bytes: &[u8]) -> Result<Value, TreeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| parse_error(Format::Toml, e))?;
    let table: toml::Table = toml::from_str(text).map_err(|e| parse_error(Format::Toml, e))?;
    Ok(from_toml(toml::Value::Table(table)))
}

pub fn parse_dotenv(bytes: &[u8]) -> Result<Value, TreeError> {
    let mut mapping = Mapping::new();
    for item in dotenvy::from_read_iter(bytes) {
        let (key, value) = item.map_err(|e| parse_error(Format::Dotenv, e))?;
        mapping.insert(Value::String(key), Value::String(value));
    }
    Ok(Value::Mapping(mapping))
}

fn parse_error(format: Format, err: impl fmt::Display) -> TreeError {
    TreeError::Parse {
        format,
        message: err.to_string(),
    }
}

pub fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                Value::Number(n.as_f64().unwrap_or(f64::NAN).into())
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Sequence(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (Value::String(k), from_json(v)))
                .collect(),
        ),
    }
}

pub fn from_toml(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => Value::Number(f.into()),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Sequence(items.into_iter().map(from_toml).collect()),
        toml::Value::Table(table) => Value::Mapping(
            table
                .into_iter()
                .map(|(k, v)| (Value::String(k), from_toml(v)))
                .collect(),
        ),
    }
}

/// Copy a mapping into a string-keyed map, stringifying scalar keys.
pub fn to_flat_map(mapping: &Mapping) -> Result<FlatMap, TreeError> {
    let mut flat = FlatMap::new();
    for (key, value) in mapping {
        let key = simple_to_string(key).ok_or(TreeError::NonScalarKey(NodeKind::of(key)))?;
        flat.insert(key, value.clone());
    }
    Ok(flat)
}

/// Scalars that can be held in a flat key/value map.
pub fn is_simple(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// Lossless string form of a simple value: integers in base 10, floats in
/// their shortest round-tripping form, booleans as `true`/`false`.
pub fn simple_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(number_to_string(n)),
        _ => None,
    }
}

fn number_to_string(n: &serde_yaml::Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.as_f64().map_or_else(|| n.to_string(), |f| f.to_string())
    }
}

/// Render a string node, or a sequence of string lines, as one text block.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect::<Option<Vec<_>>>()
            .map(|lines| lines.join("\n")),
        _ => None,
    }
}
