use crate::decode::{decode_context, DecodeOptions};
use crate::link::LinkMap;
use std::collections::BTreeMap;
use thiserror::Error;

/// Reserved path referring to the manifest file itself.
pub const SELF_PATH: &str = ".";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("manifest is not valid UTF-8")]
    NotUtf8,
    #[error("manifest.name string value must be present as a non-empty string")]
    MissingName,
    #[error("manifest.env value must be present as a table of strings")]
    InvalidEnv,
    #[error("environment substitution failed: {0}")]
    Substitution(String),
    #[error("context '{0}' not found in manifest")]
    ContextNotFound(String),
    #[error("duplicate key present in ctx and ctx.enc")]
    DuplicateKey,
    #[error("alias '{0}' collides with an existing key")]
    AliasCollision(String),
    #[error("{key}: {reason}")]
    InvalidPath { key: String, reason: &'static str },
    #[error("'{0}' is an invalid read type")]
    InvalidReadType(String),
    #[error("'{0}' is an invalid output format")]
    InvalidFormat(String),
    #[error("unsupported key '{0}'")]
    UnsupportedKey(String),
    #[error("{key} must be {expected}")]
    InvalidType { key: String, expected: &'static str },
    #[error("a path or a value must be provided")]
    MissingSource,
    #[error("a value and a path cannot both be provided")]
    ValueAndPath,
    #[error("{0}.header: object must map to a string or array of strings")]
    InvalidHeader(String),
    #[error("{key}.body: {reason}")]
    InvalidBody { key: String, reason: String },
    #[error("{name}: {source}")]
    Variable {
        name: String,
        source: Box<ManifestError>,
    },
    #[error("{name}: {source}")]
    Context {
        name: String,
        source: Box<ManifestError>,
    },
}

impl ManifestError {
    pub(crate) fn in_variable(self, name: &str) -> Self {
        Self::Variable {
            name: name.to_owned(),
            source: Box::new(self),
        }
    }

    pub(crate) fn in_context(self, name: &str) -> Self {
        Self::Context {
            name: name.to_owned(),
            source: Box::new(self),
        }
    }
}

/// A parsed cog manifest with environment substitution already applied.
#[derive(Debug, Clone)]
pub struct Manifest {
    name: String,
    text: String,
    table: toml::Table,
}

impl Manifest {
    /// Parse manifest text.
    ///
    /// When the manifest declares an `[env]` table, or `env_subst` is set,
    /// `$VAR`/`${VAR}` references in the text are substituted and the text is
    /// parsed again. Manifest `env` values take precedence over the process
    /// environment, which is only consulted when `env_subst` is set.
    pub fn parse(text: &str, env_subst: bool) -> Result<Self, ManifestError> {
        let table: toml::Table = toml::from_str(text)?;
        manifest_name(&table)?;
        let vars = manifest_env(&table)?;

        if !env_subst && vars.is_none() {
            return Self::from_table(text.to_owned(), table);
        }

        let substituted = substitute_env(text, vars.as_ref(), env_subst)?;
        let table = toml::from_str(&substituted)?;
        Self::from_table(substituted, table)
    }

    pub fn from_bytes(bytes: &[u8], env_subst: bool) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ManifestError::NotUtf8)?;
        Self::parse(text, env_subst)
    }

    fn from_table(text: String, table: toml::Table) -> Result<Self, ManifestError> {
        let name = manifest_name(&table)?.to_owned();
        Ok(Self { name, text, table })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The manifest text after substitution, reused for self-referencing links.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Look up a context table. Dotted names address nested tables.
    pub fn context(&self, name: &str) -> Result<&toml::Table, ManifestError> {
        let not_found = || ManifestError::ContextNotFound(name.to_owned());
        if let Some(value) = self.table.get(name) {
            return value.as_table().ok_or_else(not_found);
        }

        let mut current = &self.table;
        for part in name.split('.') {
            current = current
                .get(part)
                .and_then(toml::Value::as_table)
                .ok_or_else(not_found)?;
        }
        Ok(current)
    }

    /// Decode one context into its links, prefixing errors with the context name.
    pub fn decode(&self, context: &str, options: DecodeOptions) -> Result<LinkMap, ManifestError> {
        self.context(context)
            .and_then(|table| decode_context(table, options))
            .map_err(|e| e.in_context(context))
    }
}

fn manifest_name(table: &toml::Table) -> Result<&str, ManifestError> {
    match table.get("name").and_then(toml::Value::as_str) {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(ManifestError::MissingName),
    }
}

fn manifest_env(table: &toml::Table) -> Result<Option<BTreeMap<String, String>>, ManifestError> {
    let Some(env) = table.get("env") else {
        return Ok(None);
    };
    let env = env.as_table().ok_or(ManifestError::InvalidEnv)?;
    env.iter()
        .map(|(k, v)| {
            v.as_str()
                .map(|v| (k.clone(), v.to_owned()))
                .ok_or(ManifestError::InvalidEnv)
        })
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(Some)
}

/// Substitute `$VAR` and `${VAR}` references. Unknown variables are left as written.
pub fn substitute_env(
    text: &str,
    vars: Option<&BTreeMap<String, String>>,
    process_env: bool,
) -> Result<String, ManifestError> {
    let lookup = |name: &str| -> Result<Option<String>, std::env::VarError> {
        if let Some(value) = vars.and_then(|vars| vars.get(name)) {
            return Ok(Some(value.clone()));
        }
        if !process_env {
            return Ok(None);
        }
        match std::env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(e),
        }
    };
    let expanded = shellexpand::env_with_context(text, lookup)
        .map_err(|e| ManifestError::Substitution(e.to_string()))?;
    Ok(expanded.into_owned())
}
