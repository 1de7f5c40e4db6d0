//! Document visitors: answer "what is the value of this link" against one
//! loaded source document, caching decoded sub-paths.

use crate::diagnostics::{group_label, Diagnostics};
use crate::query::query_one;
use crate::{type_name, CoreError};
use cogs_schema::tree::{self, is_simple, to_flat_map, Mapping};
use cogs_schema::{FlatMap, Format, Link, NodeKind, ReadType, Value};
use std::collections::HashMap;
use tracing::debug;

/// Resolves links against one parsed document.
pub trait Visitor {
    /// Assign `link.value` from the node at the link's sub-path.
    ///
    /// A key missing from a decoded flat map is not an error here; it is
    /// recorded and reported by [`Visitor::errors`] once the batch is done.
    fn set_value(&mut self, link: &mut Link) -> Result<(), CoreError>;

    /// Missing keys recorded so far.
    fn errors(&self) -> &Diagnostics;
}

/// Build the visitor matching a source's document format.
pub fn new_visitor(format: Format, bytes: &[u8]) -> Result<Box<dyn Visitor>, CoreError> {
    let visitor = match format {
        Format::Json => DocumentVisitor::from_json(bytes)?,
        Format::Toml => DocumentVisitor::from_toml(bytes)?,
        Format::Dotenv => DocumentVisitor::from_dotenv(bytes)?,
        Format::Yaml | Format::Raw => DocumentVisitor::from_yaml(bytes)?,
    };
    Ok(Box::new(visitor))
}

/// Visitor over a document normalized to the shared tree representation.
///
/// Both caches are keyed by sub-path and live as long as the visitor, which
/// is one per distinct source.
#[derive(Debug)]
pub struct DocumentVisitor {
    root: Value,
    flat: HashMap<String, FlatMap>,
    complex: HashMap<String, Value>,
    missing: Diagnostics,
}

impl DocumentVisitor {
    pub fn new(root: Value) -> Self {
        Self {
            root,
            flat: HashMap::new(),
            complex: HashMap::new(),
            missing: Diagnostics::default(),
        }
    }

    pub fn from_yaml(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(Self::new(tree::parse_yaml(bytes)?))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(Self::new(tree::parse_json(bytes)?))
    }

    pub fn from_toml(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(Self::new(tree::parse_toml(bytes)?))
    }

    pub fn from_dotenv(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(Self::new(tree::parse_dotenv(bytes)?))
    }

    fn record_missing(&mut self, link: &Link) {
        self.missing.record(
            group_label(&link.location.path, &link.location.sub_path),
            format!("unable to find key {:?}", link.search_name),
        );
    }

    fn visit_complex(&mut self, link: &mut Link) -> Result<(), CoreError> {
        let sub_path = link.location.sub_path.as_str();
        if !self.complex.contains_key(sub_path) {
            debug!("decoding {} at '{sub_path}'", link.read_type);
            let node = query_one(&self.root, sub_path)?;
            let value = match link.read_type {
                ReadType::Whole => node,
                read_type => Value::Mapping(decode_complex(&node, read_type)?),
            };
            self.complex.insert(sub_path.to_owned(), value);
        }

        // cache hits are authoritative; the node kind is not re-validated
        let cached = &self.complex[sub_path];
        if link.read_type == ReadType::Whole {
            link.value = Some(cached.clone());
            return Ok(());
        }
        let Value::Mapping(map) = cached else {
            return Err(CoreError::NotAMap(type_name(cached)));
        };
        let value = map
            .get(link.search_name.as_str())
            .ok_or_else(|| CoreError::MissingValue(link.search_name.clone()))?;
        if is_simple(value) {
            return Err(CoreError::NotComplex {
                name: link.search_name.clone(),
                kind: type_name(value),
            });
        }
        link.value = Some(value.clone());
        Ok(())
    }
}

impl Visitor for DocumentVisitor {
    fn set_value(&mut self, link: &mut Link) -> Result<(), CoreError> {
        if link.read_type.is_complex() {
            return self.visit_complex(link);
        }

        if let Some(flat) = self.flat.get(&link.location.sub_path) {
            match flat.get(&link.search_name) {
                Some(value) if is_simple(value) => {
                    link.value = Some(value.clone());
                    return Ok(());
                }
                Some(value) => {
                    return Err(CoreError::NotSimple {
                        name: link.search_name.clone(),
                        kind: type_name(value),
                    })
                }
                None => {}
            }
            self.record_missing(link);
            return Ok(());
        }

        let sub_path = link.location.sub_path.clone();
        debug!("decoding {} at '{sub_path}'", link.read_type);
        let node = query_one(&self.root, &sub_path)?;
        let kind = if sub_path.trim().is_empty() || sub_path.trim() == "." {
            NodeKind::Document
        } else {
            NodeKind::of(&node)
        };
        if kind == NodeKind::Tagged {
            return Err(CoreError::KindMismatch {
                name: link.search_name.clone(),
                kind,
                read_type: link.read_type,
            });
        }

        let map = match link.read_type {
            ReadType::Deferred => node
                .as_mapping()
                .ok_or(CoreError::Decode {
                    kind: NodeKind::of(&node),
                    read_type: link.read_type,
                })
                .and_then(|m| to_flat_map(m).map_err(CoreError::from))?,
            ReadType::Json | ReadType::Yaml | ReadType::Toml => decode_flat(&node, link.read_type)?,
            ReadType::Dotenv => decode_dotenv(&node)?,
            other => return Err(CoreError::UnsupportedReadType(other)),
        };
        self.flat.insert(sub_path, map);
        self.set_value(link)
    }

    fn errors(&self) -> &Diagnostics {
        &self.missing
    }
}

/// Decode a mapping node directly, or a string node holding document text.
fn decode_flat(node: &Value, read_type: ReadType) -> Result<FlatMap, CoreError> {
    if let Value::Mapping(map) = node {
        return Ok(to_flat_map(map)?);
    }
    let text = tree::as_text(node).ok_or(CoreError::Decode {
        kind: NodeKind::of(node),
        read_type,
    })?;
    let map = parse_text_mapping(&text, read_type, node)?;
    Ok(to_flat_map(&map)?)
}

fn decode_dotenv(node: &Value) -> Result<FlatMap, CoreError> {
    if let Value::Mapping(map) = node {
        return Ok(to_flat_map(map)?);
    }
    let text = tree::as_text(node).ok_or(CoreError::Decode {
        kind: NodeKind::of(node),
        read_type: ReadType::Dotenv,
    })?;
    match tree::parse_dotenv(text.as_bytes())? {
        Value::Mapping(map) => Ok(to_flat_map(&map)?),
        _ => Ok(FlatMap::new()),
    }
}

fn decode_complex(node: &Value, read_type: ReadType) -> Result<Mapping, CoreError> {
    match node {
        Value::Mapping(map) => Ok(map.clone()),
        Value::String(text) => parse_text_mapping(text, read_type, node),
        _ => Err(CoreError::Decode {
            kind: NodeKind::of(node),
            read_type,
        }),
    }
}

fn parse_text_mapping(text: &str, read_type: ReadType, node: &Value) -> Result<Mapping, CoreError> {
    let format = read_type
        .text_format()
        .ok_or(CoreError::UnsupportedReadType(read_type))?;
    match tree::parse(format, text.as_bytes())? {
        Value::Mapping(map) => Ok(map),
        _ => Err(CoreError::Decode {
            kind: NodeKind::of(node),
            read_type,
        }),
    }
}
