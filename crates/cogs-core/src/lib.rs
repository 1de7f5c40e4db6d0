//! Link resolution engine for cogs.
//!
//! This crate turns the links of one manifest context into a flat key/value
//! map: links are grouped by distinct source (`loader`), each source is loaded
//! once and handed to a format-agnostic `DocumentVisitor` that answers sub-path
//! queries (`query`), nested manifests are resolved recursively by the
//! `Resolver`, and final values are shaped for the requested output format
//! (`project`).

pub mod decrypt;
pub mod diagnostics;
pub mod filter;
pub mod gear;
pub mod loader;
pub mod project;
pub mod query;
pub mod visitor;

pub use decrypt::{Decryptor, SopsDecryptor};
pub use diagnostics::Diagnostics;
pub use filter::LinkFilter;
pub use gear::{Gear, ResolveOptions, Resolver, DEFAULT_RECURSION_LIMIT};
pub use loader::{group_links, DefaultLoader, Source, SourceLoader, Target};
pub use project::project;
pub use visitor::{new_visitor, DocumentVisitor, Visitor};

use cogs_schema::{Format, ManifestError, NodeKind, ReadType, TreeError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("{0}")]
    Tree(#[from] TreeError),
    #[error("remote error: {0}")]
    Remote(#[from] cogs_remote::RemoteError),
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no such file: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("recursion limit of {0} reached")]
    RecursionLimit(usize),
    #[error("{name}: NodeKind/readType unsupported: {kind}/{read_type}")]
    KindMismatch {
        name: String,
        kind: NodeKind,
        read_type: ReadType,
    },
    #[error("returned non singular result for path '{0}'")]
    NonSingular(String),
    #[error("invalid path expression '{expr}': {reason}")]
    Query { expr: String, reason: String },
    #[error("unsupported read type: {0}")]
    UnsupportedReadType(ReadType),
    #[error("unable to decode node kind {kind} to {read_type} format")]
    Decode { kind: NodeKind, read_type: ReadType },
    #[error("{name} of type {kind} is not a simple value")]
    NotSimple { name: String, kind: &'static str },
    #[error("{name} of type {kind} is not a complex value")]
    NotComplex { name: String, kind: &'static str },
    #[error("path does not resolve to a map: {0}")]
    NotAMap(&'static str),
    #[error("unable to find {0}")]
    MissingValue(String),
    #[error("[{0}] missing from generated config")]
    FilteredKeyMissing(String),
    #[error("{0} is not valid UTF-8")]
    NotUtf8(String),
    #[error("failed to serialize {name} as {format}: {reason}")]
    Serialize {
        name: String,
        format: Format,
        reason: String,
    },
    #[error("invalid options: {0}")]
    Options(&'static str),
    #[error("{name}: {source}")]
    Link {
        name: String,
        source: Box<CoreError>,
    },
    #[error("{0}")]
    Unresolved(Diagnostics),
}

impl CoreError {
    /// Prefix an error with the key of the link it belongs to.
    pub fn in_link(self, name: &str) -> Self {
        Self::Link {
            name: name.to_owned(),
            source: Box::new(self),
        }
    }

    /// Whether the root cause is a malformed manifest rather than a failed load.
    pub fn is_manifest_error(&self) -> bool {
        match self {
            Self::Manifest(_) => true,
            Self::Link { source, .. } => source.is_manifest_error(),
            _ => false,
        }
    }
}

/// Short name of a value's type for error messages.
pub(crate) fn type_name(value: &cogs_schema::Value) -> &'static str {
    use cogs_schema::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}
