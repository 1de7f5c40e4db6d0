use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Recoverable resolution failures collected across a whole batch of links.
///
/// Messages are grouped by the source they came from, written as
/// `["path", "subpath"]`, and deduplicated within a group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl Diagnostics {
    pub fn record(&mut self, group: impl Into<String>, message: impl Into<String>) {
        self.groups
            .entry(group.into())
            .or_default()
            .insert(message.into());
    }

    pub fn extend(&mut self, other: &Diagnostics) {
        for (group, messages) in &other.groups {
            self.groups
                .entry(group.clone())
                .or_default()
                .extend(messages.iter().cloned());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of messages over all groups.
    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeSet::len).sum()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (group, messages)) in self.groups.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{group}:")?;
            for message in messages {
                write!(f, "\n      {message}")?;
            }
        }
        Ok(())
    }
}

/// Group label for a source location, with an empty sub-path shown as `.`.
pub(crate) fn group_label(path: &str, sub_path: &str) -> String {
    let sub_path = if sub_path.is_empty() { "." } else { sub_path };
    format!("[{path:?}, {sub_path:?}]")
}
