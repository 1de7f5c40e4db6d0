use crate::CoreError;
use cogs_schema::LinkMap;

/// Key selection applied to decoded links before any source is loaded.
///
/// Exclusion runs first: a key named in both `not` and `keys` is excluded,
/// and its `keys` entry then reports it as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFilter {
    /// Retain only these keys, when non-empty.
    pub keys: Vec<String>,
    /// Drop these keys.
    pub not: Vec<String>,
}

impl LinkFilter {
    pub fn new(keys: Vec<String>, not: Vec<String>) -> Self {
        Self { keys, not }
    }

    pub fn include<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            not: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.not.is_empty()
    }

    pub fn apply(&self, mut links: LinkMap) -> Result<LinkMap, CoreError> {
        for key in &self.not {
            links.remove(key);
        }
        if self.keys.is_empty() {
            return Ok(links);
        }

        let mut kept = LinkMap::new();
        for key in &self.keys {
            if kept.contains_key(key) {
                continue;
            }
            let link = links
                .remove(key)
                .ok_or_else(|| CoreError::FilteredKeyMissing(key.clone()))?;
            kept.insert(key.clone(), link);
        }
        Ok(kept)
    }
}
