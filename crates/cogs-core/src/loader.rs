use crate::decrypt::{Decryptor, SopsDecryptor};
use crate::CoreError;
use cogs_remote::{HttpClient, HttpRequest, Transport};
use cogs_schema::{Format, LinkMap, SourceKey};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the bytes of a source live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File(PathBuf),
    Remote(HttpRequest),
}

/// One distinct source to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub target: Target,
    pub encrypted: bool,
    /// Document format, used to drive decryption.
    pub format: Format,
}

impl Source {
    pub fn describe(&self) -> String {
        match &self.target {
            Target::File(path) => path.display().to_string(),
            Target::Remote(request) => format!("{} {}", request.method, request.url),
        }
    }
}

/// Loads the raw bytes of a source. Called once per distinct source.
pub trait SourceLoader {
    fn load(&self, source: &Source) -> Result<Vec<u8>, CoreError>;
}

/// Reads local files, fetches remote sources over HTTP and decrypts when
/// the source is marked encrypted.
pub struct DefaultLoader {
    transport: Box<dyn Transport>,
    decryptor: Box<dyn Decryptor>,
}

impl Default for DefaultLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultLoader {
    pub fn new() -> Self {
        Self {
            transport: Box::new(HttpClient::new()),
            decryptor: Box::new(SopsDecryptor::default()),
        }
    }

    #[must_use]
    pub fn with_decryptor(mut self, decryptor: Box<dyn Decryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }
}

impl SourceLoader for DefaultLoader {
    fn load(&self, source: &Source) -> Result<Vec<u8>, CoreError> {
        debug!("loading {}", source.describe());
        let bytes = match &source.target {
            Target::File(path) => read_file(path)?,
            Target::Remote(request) => self.transport.fetch(request)?,
        };
        if source.encrypted {
            return self.decryptor.decrypt(&bytes, source.format);
        }
        Ok(bytes)
    }
}

/// Read a local file, distinguishing a missing file from other failures.
pub fn read_file(path: &Path) -> Result<Vec<u8>, CoreError> {
    fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            CoreError::SourceNotFound(path.to_path_buf())
        } else {
            CoreError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Partition sourced links by distinct source. Inline literals are skipped.
///
/// Key names within a group keep the map's sorted order.
pub fn group_links(links: &LinkMap) -> BTreeMap<SourceKey, Vec<String>> {
    let mut groups: BTreeMap<SourceKey, Vec<String>> = BTreeMap::new();
    for (key, link) in links {
        if let Some(source) = link.source_key() {
            groups.entry(source).or_default().push(key.clone());
        }
    }
    groups
}
