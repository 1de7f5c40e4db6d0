//! Decoding of one context's untyped table into typed [`Link`]s.
//!
//! This is the only place that inspects raw `toml::Value`s of a context.
//! Processing order determines precedence: context defaults first, then the
//! `enc` section, then plaintext `vars`, then alias expansion.

use crate::format::ReadType;
use crate::link::{canonical_header_key, is_valid_url, Header, HttpOptions, Link, LinkMap, Location};
use crate::manifest::ManifestError;
use crate::tree::from_toml;

const CONTEXT_KEYS: &[&str] = &["path", "type", "name", "header", "method", "body", "vars", "enc"];
const ENC_KEYS: &[&str] = &["path", "type", "name", "header", "method", "body", "vars"];
const VAR_KEYS: &[&str] = &[
    "name", "path", "type", "aliases", "header", "method", "body", "value",
];

const PATH_ARRAY_LEN: &str =
    "path array must have a length of two, providing path and subpath respectively";
const PATH_ELEMENT: &str = "path array elements must be a string or an empty array";
const PATH_SHAPE: &str = "path must be a string or an array";

#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Do not decode the `enc` section at all.
    pub skip_encrypted: bool,
    /// Decode the `enc` section but mark its links as plaintext.
    pub skip_decrypt: bool,
}

/// Context-level defaults. Never output, only inherited.
#[derive(Debug, Clone, Default)]
struct BaseLink {
    location: Location,
    read_type: Option<ReadType>,
    search_name: Option<String>,
    header: Option<Header>,
    method: Option<String>,
    body: Option<String>,
}

pub fn decode_context(
    table: &toml::Table,
    options: DecodeOptions,
) -> Result<LinkMap, ManifestError> {
    check_keys(table, CONTEXT_KEYS, None)?;
    let base = decode_base(table, &BaseLink::default())?;
    let mut links = LinkMap::new();

    if !options.skip_encrypted {
        if let Some(enc) = table.get("enc") {
            let enc = expect_table("enc", enc)?;
            check_keys(enc, ENC_KEYS, Some("enc"))?;
            // the enc section carries its own path; everything else falls through
            let parent = BaseLink {
                location: Location::default(),
                ..base.clone()
            };
            let enc_base = decode_base(enc, &parent)?;
            for mut link in decode_vars(enc, &enc_base)? {
                link.encrypted = !options.skip_decrypt;
                links.insert(link.key_name.clone(), link);
            }
        }
    }

    for link in decode_vars(table, &base)? {
        if links.contains_key(&link.key_name) {
            return Err(ManifestError::DuplicateKey.in_variable(&link.key_name));
        }
        links.insert(link.key_name.clone(), link);
    }

    expand_aliases(&mut links)?;
    Ok(links)
}

fn decode_base(table: &toml::Table, parent: &BaseLink) -> Result<BaseLink, ManifestError> {
    let mut base = parent.clone();
    if let Some(path) = table.get("path") {
        base.location = decode_path("path", path, &parent.location)?;
    }
    if let Some(read_type) = table.get("type") {
        base.read_type = Some(decode_read_type("type", read_type)?);
    }
    if let Some(name) = table.get("name") {
        base.search_name = Some(expect_str("name", name)?.to_owned());
    }
    if let Some(header) = table.get("header") {
        base.header = Some(decode_header("ctx", header)?);
    }
    if let Some(method) = table.get("method") {
        base.method = Some(expect_str("method", method)?.to_uppercase());
    }
    if let Some(body) = table.get("body") {
        base.body = Some(decode_body("ctx", body)?);
    }
    Ok(base)
}

fn decode_vars(table: &toml::Table, base: &BaseLink) -> Result<Vec<Link>, ManifestError> {
    let Some(vars) = table.get("vars") else {
        return Ok(Vec::new());
    };
    let vars = expect_table("vars", vars)?;
    vars.iter()
        .map(|(name, value)| decode_var(name, value, base).map_err(|e| e.in_variable(name)))
        .collect()
}

fn decode_var(name: &str, value: &toml::Value, base: &BaseLink) -> Result<Link, ManifestError> {
    match value {
        toml::Value::Table(table) => decode_link_table(name, table, base),
        toml::Value::Array(_) => Err(ManifestError::InvalidType {
            key: name.to_owned(),
            expected: "a scalar value or a table",
        }),
        scalar => Ok(Link::literal(name, from_toml(scalar.clone()))),
    }
}

fn decode_link_table(
    name: &str,
    table: &toml::Table,
    base: &BaseLink,
) -> Result<Link, ManifestError> {
    check_keys(table, VAR_KEYS, Some(name))?;

    let literal = match table.get("value") {
        Some(toml::Value::Table(_) | toml::Value::Array(_)) => {
            return Err(ManifestError::InvalidType {
                key: format!("{name}.value"),
                expected: "a scalar value",
            })
        }
        Some(value) => Some(from_toml(value.clone())),
        None => None,
    };
    let location = match table.get("path") {
        Some(path) => Some(decode_path(&format!("{name}.path"), path, &base.location)?),
        None => None,
    };

    let mut link = match (literal, location) {
        (Some(_), Some(_)) => return Err(ManifestError::ValueAndPath),
        (None, None) => return Err(ManifestError::MissingSource),
        (Some(value), None) => Link::literal(name, value),
        (None, Some(location)) if location.is_literal() => {
            return Err(ManifestError::MissingSource)
        }
        (None, Some(location)) => Link::sourced(name, location),
    };

    link.search_name = match table.get("name") {
        Some(search) => expect_str(&format!("{name}.name"), search)?.to_owned(),
        None => base.search_name.clone().unwrap_or_else(|| name.to_owned()),
    };
    link.read_type = match table.get("type") {
        Some(read_type) => decode_read_type(&format!("{name}.type"), read_type)?,
        None => base.read_type.unwrap_or_default(),
    };
    if let Some(aliases) = table.get("aliases") {
        link.aliases = decode_aliases(name, aliases)?;
    }
    link.http = decode_http(name, table, base, link.remote)?;
    Ok(link)
}

/// Explicit declarations always win; defaults only reach remote sources.
fn decode_http(
    name: &str,
    table: &toml::Table,
    base: &BaseLink,
    remote: bool,
) -> Result<HttpOptions, ManifestError> {
    let mut http = HttpOptions::default();
    match table.get("header") {
        Some(header) => http.header = decode_header(name, header)?,
        None if remote => http.header = base.header.clone().unwrap_or_default(),
        None => {}
    }
    match table.get("method") {
        Some(method) => http.method = expect_str(&format!("{name}.method"), method)?.to_uppercase(),
        None if remote => http.method = base.method.clone().unwrap_or_default(),
        None => {}
    }
    match table.get("body") {
        Some(body) => http.body = decode_body(name, body)?,
        None if remote => http.body = base.body.clone().unwrap_or_default(),
        None => {}
    }
    Ok(http)
}

/// Decode a `path` declaration against the inherited location.
///
/// - `"file"`: path only, sub-path empty
/// - `[]`: path and sub-path inherited
/// - `[p, s]`: each element is a string, or `[]` to inherit that element
pub fn decode_path(
    key: &str,
    value: &toml::Value,
    base: &Location,
) -> Result<Location, ManifestError> {
    let invalid = |reason| ManifestError::InvalidPath {
        key: key.to_owned(),
        reason,
    };
    match value {
        toml::Value::String(path) => Ok(Location::new(path.clone(), String::new())),
        toml::Value::Array(items) => match items.as_slice() {
            [] => Ok(base.clone()),
            [path, sub_path] => Ok(Location {
                path: path_element(path, &base.path).ok_or_else(|| invalid(PATH_ELEMENT))?,
                sub_path: path_element(sub_path, &base.sub_path)
                    .ok_or_else(|| invalid(PATH_ELEMENT))?,
            }),
            _ => Err(invalid(PATH_ARRAY_LEN)),
        },
        _ => Err(invalid(PATH_SHAPE)),
    }
}

fn path_element(element: &toml::Value, inherited: &str) -> Option<String> {
    match element {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Array(items) if items.is_empty() => Some(inherited.to_owned()),
        _ => None,
    }
}

fn decode_read_type(key: &str, value: &toml::Value) -> Result<ReadType, ManifestError> {
    expect_str(key, value)?.parse()
}

fn decode_aliases(name: &str, value: &toml::Value) -> Result<Vec<String>, ManifestError> {
    let invalid = || ManifestError::InvalidType {
        key: format!("{name}.aliases"),
        expected: "an array of strings",
    };
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|alias| alias.as_str().map(str::to_owned).ok_or_else(invalid))
        .collect()
}

fn decode_header(name: &str, value: &toml::Value) -> Result<Header, ManifestError> {
    let invalid = || ManifestError::InvalidHeader(name.to_owned());
    let table = value.as_table().ok_or_else(invalid)?;
    let mut header = Header::new();
    for (key, values) in table {
        let entry = header.entry(canonical_header_key(key)).or_default();
        match values {
            toml::Value::String(v) => entry.push(v.clone()),
            toml::Value::Array(items) => {
                for item in items {
                    entry.push(item.as_str().ok_or_else(invalid)?.to_owned());
                }
            }
            _ => return Err(invalid()),
        }
    }
    Ok(header)
}

/// Bodies are JSON text or a table, normalized to compact JSON.
fn decode_body(name: &str, value: &toml::Value) -> Result<String, ManifestError> {
    let invalid = |reason: String| ManifestError::InvalidBody {
        key: name.to_owned(),
        reason,
    };
    match value {
        toml::Value::String(text) if text.is_empty() => Ok(String::new()),
        toml::Value::String(text) => {
            let json: serde_json::Value =
                serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
            Ok(json.to_string())
        }
        toml::Value::Table(table) => {
            serde_json::to_string(table).map_err(|e| invalid(e.to_string()))
        }
        _ => Err(invalid("must be JSON text or a table".to_owned())),
    }
}

fn expand_aliases(links: &mut LinkMap) -> Result<(), ManifestError> {
    let mut aliased: Vec<Link> = Vec::new();
    for (key, link) in links.iter() {
        for alias in &link.aliases {
            if links.contains_key(alias) || aliased.iter().any(|l| &l.key_name == alias) {
                return Err(ManifestError::AliasCollision(alias.clone()).in_variable(key));
            }
            let mut entry = link.clone();
            entry.key_name.clone_from(alias);
            entry.aliases.clear();
            aliased.push(entry);
        }
    }
    for link in aliased {
        links.insert(link.key_name.clone(), link);
    }
    Ok(())
}

fn check_keys(
    table: &toml::Table,
    allowed: &[&str],
    prefix: Option<&str>,
) -> Result<(), ManifestError> {
    match table.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(ManifestError::UnsupportedKey(match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        })),
        None => Ok(()),
    }
}

fn expect_table<'a>(key: &str, value: &'a toml::Value) -> Result<&'a toml::Table, ManifestError> {
    value.as_table().ok_or_else(|| ManifestError::InvalidType {
        key: key.to_owned(),
        expected: "a table",
    })
}

fn expect_str<'a>(key: &str, value: &'a toml::Value) -> Result<&'a str, ManifestError> {
    value.as_str().ok_or_else(|| ManifestError::InvalidType {
        key: key.to_owned(),
        expected: "a string",
    })
}
