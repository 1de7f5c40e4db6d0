use crate::format::{Format, ReadType};
use crate::manifest::SELF_PATH;
use crate::tree::Value;
use std::collections::BTreeMap;

/// HTTP header map with canonicalized keys (`content-type` -> `Content-Type`).
pub type Header = BTreeMap<String, Vec<String>>;

/// Decoded links of one context, keyed by output key name.
pub type LinkMap = BTreeMap<String, Link>;

pub const DEFAULT_METHOD: &str = "GET";

/// Where a link's value comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// Empty for inline literals, [`SELF_PATH`] for the manifest itself,
    /// otherwise a filesystem path or URL.
    pub path: String,
    /// Query expression into the parsed document; empty means the root.
    pub sub_path: String,
}

impl Location {
    pub fn new(path: impl Into<String>, sub_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sub_path: sub_path.into(),
        }
    }

    pub fn is_literal(&self) -> bool {
        self.path.is_empty()
    }

    pub fn is_self(&self) -> bool {
        self.path == SELF_PATH
    }
}

/// Transport overrides for remote sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpOptions {
    pub header: Header,
    pub method: String,
    /// Compact JSON text, empty when no body is sent.
    pub body: String,
}

impl HttpOptions {
    pub fn method(&self) -> &str {
        if self.method.is_empty() {
            DEFAULT_METHOD
        } else {
            &self.method
        }
    }

    pub fn accepts_json(&self) -> bool {
        self.header
            .get("Accept")
            .and_then(|values| values.first())
            .is_some_and(|v| v == "application/json")
    }
}

/// One unresolved configuration variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub key_name: String,
    pub search_name: String,
    pub value: Option<Value>,
    pub location: Location,
    pub encrypted: bool,
    pub remote: bool,
    pub http: HttpOptions,
    pub read_type: ReadType,
    pub aliases: Vec<String>,
}

impl Link {
    pub fn literal(key_name: impl Into<String>, value: Value) -> Self {
        let key_name = key_name.into();
        Self {
            search_name: key_name.clone(),
            key_name,
            value: Some(value),
            location: Location::default(),
            encrypted: false,
            remote: false,
            http: HttpOptions::default(),
            read_type: ReadType::Deferred,
            aliases: Vec::new(),
        }
    }

    pub fn sourced(key_name: impl Into<String>, location: Location) -> Self {
        let key_name = key_name.into();
        let remote = is_valid_url(&location.path);
        Self {
            search_name: key_name.clone(),
            key_name,
            value: None,
            location,
            encrypted: false,
            remote,
            http: HttpOptions::default(),
            read_type: ReadType::Deferred,
            aliases: Vec::new(),
        }
    }

    /// The distinct source this link loads from, `None` for inline literals.
    pub fn source_key(&self) -> Option<SourceKey> {
        if self.location.is_literal() {
            return None;
        }
        let mut key = SourceKey {
            path: self.location.path.clone(),
            encrypted: self.encrypted,
            header: Header::new(),
            method: String::new(),
            body: String::new(),
        };
        if self.remote {
            key.header.clone_from(&self.http.header);
            key.method = self.http.method().to_owned();
            key.body.clone_from(&self.http.body);
        }
        Some(key)
    }

    /// Notation of the link's source, from its read type or path suffix.
    pub fn input_format(&self) -> Format {
        if self.remote && self.http.accepts_json() {
            return Format::Json;
        }
        match self.read_type.text_format() {
            Some(format) => format,
            None => Format::for_path(&self.location.path),
        }
    }
}

/// Identity of a loadable source.
///
/// Remote sources only share a load when header, method and body match too;
/// local files are always shared by path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceKey {
    pub path: String,
    pub encrypted: bool,
    pub header: Header,
    pub method: String,
    pub body: String,
}

impl SourceKey {
    pub fn is_self(&self) -> bool {
        self.path == SELF_PATH
    }
}

/// Whether a path is a well-formed URL with a scheme and host.
pub fn is_valid_url(path: &str) -> bool {
    url::Url::parse(path).is_ok_and(|u| !u.scheme().is_empty() && u.host_str().is_some())
}

/// Canonical MIME header key: first letter and letters after `-` upper case.
pub fn canonical_header_key(key: &str) -> String {
    if key.chars().any(|c| c.is_whitespace() || c == ':') {
        return key.to_owned();
    }
    let mut out = String::with_capacity(key.len());
    let mut upper = true;
    for c in key.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}
