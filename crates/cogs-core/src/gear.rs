use crate::diagnostics::{group_label, Diagnostics};
use crate::filter::LinkFilter;
use crate::loader::{group_links, read_file, Source, SourceLoader, Target};
use crate::project::project;
use crate::visitor::{new_visitor, Visitor};
use crate::CoreError;
use cogs_remote::HttpRequest;
use cogs_schema::{
    DecodeOptions, FlatMap, Format, Link, LinkMap, Manifest, ReadType, SourceKey, Value,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_RECURSION_LIMIT: usize = 10;

/// Switches fixed for a whole resolution run, nested manifests included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Drop every `enc` section before resolution.
    pub skip_encrypted: bool,
    /// Load `enc` sources but do not decrypt them.
    pub skip_decrypt: bool,
    /// Substitute process environment variables into manifest text.
    pub env_subst: bool,
    /// Maximum depth of nested manifests.
    pub recursion_limit: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            skip_encrypted: false,
            skip_decrypt: false,
            env_subst: false,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl ResolveOptions {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.skip_encrypted && self.skip_decrypt {
            return Err(CoreError::Options(
                "skip-encrypted and skip-decrypt cannot both be set",
            ));
        }
        Ok(())
    }

    fn decode_options(self) -> DecodeOptions {
        DecodeOptions {
            skip_encrypted: self.skip_encrypted,
            skip_decrypt: self.skip_decrypt,
        }
    }
}

/// A loaded manifest together with the directory its relative paths
/// resolve against.
#[derive(Debug, Clone)]
pub struct Gear {
    name: String,
    manifest: Manifest,
    path: PathBuf,
    dir: PathBuf,
}

impl Gear {
    /// Read and parse a manifest file.
    pub fn load(path: impl AsRef<Path>, env_subst: bool) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let bytes = read_file(path)?;
        let manifest = Manifest::from_bytes(&bytes, env_subst)?;
        Ok(Self::new(manifest, path))
    }

    pub fn new(manifest: Manifest, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            name: String::new(),
            manifest,
            path,
            dir,
        }
    }

    /// Dotted name of the link chain that led to this gear; empty at the top.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a link path against this gear. Absolute paths stay as they are.
    pub fn resolve_path(&self, link_path: &str) -> PathBuf {
        if link_path == cogs_schema::SELF_PATH {
            return self.path.clone();
        }
        let path = Path::new(link_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }

    fn nested(&self, key: &str, manifest: Manifest, source: &SourceKey) -> Self {
        let name = if self.name.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{key}", self.name)
        };
        // remote manifests keep resolving relative paths against their parent
        let (path, dir) = if source.is_self() {
            (self.path.clone(), self.dir.clone())
        } else if cogs_schema::is_valid_url(&source.path) {
            (PathBuf::from(&source.path), self.dir.clone())
        } else {
            let path = self.resolve_path(&source.path);
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (path, dir)
        };
        Self {
            name,
            manifest,
            path,
            dir,
        }
    }
}

/// Drives resolution of a context: decode, filter, load each distinct source
/// once, visit, recurse into nested manifests, project.
pub struct Resolver<'l> {
    loader: &'l dyn SourceLoader,
    options: ResolveOptions,
}

impl<'l> Resolver<'l> {
    pub fn new(loader: &'l dyn SourceLoader, options: ResolveOptions) -> Result<Self, CoreError> {
        options.validate()?;
        Ok(Self { loader, options })
    }

    /// Resolve `context` of `gear` into a flat map shaped for `output`.
    ///
    /// All missing keys and missing local files across the context are
    /// reported together; no partial map is ever returned.
    pub fn resolve(
        &self,
        gear: &Gear,
        context: &str,
        filter: &LinkFilter,
        output: Format,
    ) -> Result<FlatMap, CoreError> {
        self.resolve_at(gear, context, filter, output, 0)
    }

    fn resolve_at(
        &self,
        gear: &Gear,
        context: &str,
        filter: &LinkFilter,
        output: Format,
        depth: usize,
    ) -> Result<FlatMap, CoreError> {
        info!(
            "resolving context '{context}' of '{}' (depth {depth})",
            gear.manifest.name()
        );
        let links = gear.manifest.decode(context, self.options.decode_options())?;
        let mut links = filter.apply(links)?;

        let mut diagnostics = Diagnostics::default();
        for (source, keys) in group_links(&links) {
            let has_gears = keys.iter().any(|k| links[k].read_type == ReadType::Gear);
            if has_gears && depth + 1 > self.options.recursion_limit {
                return Err(CoreError::RecursionLimit(self.options.recursion_limit));
            }

            let bytes = match self.load(gear, &source, &links[&keys[0]]) {
                Ok(bytes) => bytes,
                Err(CoreError::SourceNotFound(path)) => {
                    warn!("source not found: {}", path.display());
                    diagnostics.record(
                        group_label(&source.path, ""),
                        format!("no such file: {}", path.display()),
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.resolve_group(
                gear,
                &source,
                &keys,
                &bytes,
                &mut links,
                output,
                depth,
                &mut diagnostics,
            )?;
        }

        if !diagnostics.is_empty() {
            return Err(CoreError::Unresolved(diagnostics));
        }

        let mut out = FlatMap::new();
        for (key, link) in &links {
            out.insert(key.clone(), project(link, output).map_err(|e| e.in_link(key))?);
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_group(
        &self,
        gear: &Gear,
        source: &SourceKey,
        keys: &[String],
        bytes: &[u8],
        links: &mut LinkMap,
        output: Format,
        depth: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), CoreError> {
        let mut visitor: Option<Box<dyn Visitor>> = None;
        // nested context name -> gear links reading from it
        let mut gear_links: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for key in keys {
            let Some(link) = links.get_mut(key) else {
                continue;
            };
            match link.read_type {
                ReadType::Raw => {
                    let text = std::str::from_utf8(bytes)
                        .map_err(|_| CoreError::NotUtf8(source.path.clone()).in_link(key))?;
                    link.value = Some(Value::String(text.to_owned()));
                }
                ReadType::Gear => {
                    gear_links
                        .entry(link.location.sub_path.clone())
                        .or_default()
                        .push(key.clone());
                }
                _ => {
                    if visitor.is_none() {
                        visitor = Some(new_visitor(document_format(link), bytes)?);
                    }
                    if let Some(visitor) = visitor.as_mut() {
                        visitor.set_value(link).map_err(|e| e.in_link(key))?;
                    }
                }
            }
        }
        if let Some(visitor) = &visitor {
            diagnostics.extend(visitor.errors());
        }
        if gear_links.is_empty() {
            return Ok(());
        }

        let env_subst = self.options.env_subst && !source.is_self();
        for (context, keys) in gear_links {
            let first = &keys[0];
            let manifest = Manifest::from_bytes(bytes, env_subst)
                .map_err(|e| CoreError::from(e).in_link(first))?;
            let nested = gear.nested(first, manifest, source);
            let search: Vec<String> = keys
                .iter()
                .map(|k| links[k].search_name.clone())
                .collect();
            debug!(
                "recursing into context '{context}' for '{}' at depth {}",
                nested.name(),
                depth + 1
            );
            let values = self
                .resolve_at(&nested, &context, &LinkFilter::include(search), output, depth + 1)
                .map_err(|e| e.in_link(first))?;

            for key in &keys {
                let Some(link) = links.get_mut(key) else {
                    continue;
                };
                let value = values.get(&link.search_name).cloned().ok_or_else(|| {
                    CoreError::MissingValue(link.search_name.clone()).in_link(key)
                })?;
                link.value = Some(value);
            }
        }
        Ok(())
    }

    fn load(&self, gear: &Gear, source: &SourceKey, link: &Link) -> Result<Vec<u8>, CoreError> {
        // the manifest text is already loaded and substituted
        if source.is_self() {
            return Ok(gear.manifest.text().as_bytes().to_vec());
        }
        let target = if link.remote {
            Target::Remote(HttpRequest {
                url: link.location.path.clone(),
                header: link.http.header.clone(),
                method: link.http.method().to_owned(),
                body: link.http.body.clone(),
            })
        } else {
            Target::File(gear.resolve_path(&link.location.path))
        };
        self.loader.load(&Source {
            target,
            encrypted: link.encrypted,
            format: document_format(link),
        })
    }
}

/// Format the whole source document is parsed in.
///
/// The manifest itself is TOML; remote sources asking for JSON are JSON;
/// otherwise the path suffix decides.
fn document_format(link: &Link) -> Format {
    if link.location.is_self() {
        Format::Toml
    } else if link.remote && link.http.accepts_json() {
        Format::Json
    } else {
        Format::for_path(&link.location.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_reject_conflicting_encryption_switches() {
        let options = ResolveOptions {
            skip_encrypted: true,
            skip_decrypt: true,
            ..ResolveOptions::default()
        };
        assert!(matches!(options.validate(), Err(CoreError::Options(_))));
        assert!(ResolveOptions::default().validate().is_ok());
    }

    #[test]
    fn relative_paths_resolve_against_manifest_dir() {
        let manifest = Manifest::parse("name = \"app\"\n", false).unwrap();
        let gear = Gear::new(manifest, "/etc/cogs/app.cog.toml");
        assert_eq!(gear.resolve_path("./a.yaml"), Path::new("/etc/cogs/./a.yaml"));
        assert_eq!(gear.resolve_path("/abs.yaml"), Path::new("/abs.yaml"));
        assert_eq!(gear.resolve_path("."), Path::new("/etc/cogs/app.cog.toml"));
    }

    #[test]
    fn nested_gears_get_dotted_names() {
        let manifest = Manifest::parse("name = \"app\"\n", false).unwrap();
        let gear = Gear::new(manifest.clone(), "/etc/cogs/app.cog.toml");
        let source = Link::sourced("db", cogs_schema::Location::new("./sub/db.cog.toml", "qa"))
            .source_key()
            .unwrap();
        let child = gear.nested("db", manifest.clone(), &source);
        assert_eq!(child.name(), "db");
        assert_eq!(child.path(), Path::new("/etc/cogs/./sub/db.cog.toml"));
        let grandchild = child.nested("host", manifest, &source);
        assert_eq!(grandchild.name(), "db.host");
    }

    #[test]
    fn self_documents_are_toml() {
        let link = Link::sourced("a", cogs_schema::Location::new(".", ".x"));
        assert_eq!(document_format(&link), Format::Toml);
    }
}
