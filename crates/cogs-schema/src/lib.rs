//! Manifest parsing, link decoding, read types and the document tree for cogs.
//!
//! This crate defines the schema layer: TOML cog manifests (`Manifest`),
//! per-context decoding into typed links (`Link`, `LinkMap`), the read-type
//! vocabulary (`ReadType`, `Format`), and the normalized document tree every
//! source format is parsed into (`Value`).

pub mod decode;
pub mod format;
pub mod link;
pub mod manifest;
pub mod tree;

pub use decode::DecodeOptions;
pub use format::{Format, ReadType};
pub use link::{is_valid_url, Header, HttpOptions, Link, LinkMap, Location, SourceKey};
pub use manifest::{Manifest, ManifestError, SELF_PATH};
pub use tree::{FlatMap, Mapping, NodeKind, TreeError, Value};
