//! Source path → destination document index.
//!
//! Phase 1 records entries through a [`LocationMapBuilder`] (insert-once, safe
//! to share between concurrent creations). Phase 2 only ever sees the frozen
//! [`LocationMap`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub destination_id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct LocationMapBuilder {
    entries: Mutex<Vec<(PathBuf, Location)>>,
}

impl LocationMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path`; returns `false` (and keeps the first entry) if it is
    /// already present.
    pub fn insert(&self, path: impl Into<PathBuf>, location: Location) -> bool {
        let path = path.into();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.iter().any(|(existing, _)| *existing == path) {
            return false;
        }
        entries.push((path, location));
        true
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn freeze(self) -> LocationMap {
        let entries = self
            .entries
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        LocationMap::from_entries(entries)
    }
}

/// Read-only map, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct LocationMap {
    entries: Vec<(PathBuf, Location)>,
}

impl LocationMap {
    pub fn from_entries(entries: Vec<(PathBuf, Location)>) -> Self {
        let mut map = Self::default();
        for (path, location) in entries {
            if !map.entries.iter().any(|(existing, _)| *existing == path) {
                map.entries.push((path, location));
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&Location> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == path)
            .map(|(_, location)| location)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Location)> {
        self.entries.iter().map(|(path, loc)| (path.as_path(), loc))
    }

    /// Resolve a normalized link path.
    ///
    /// A key whose path (with its `.md` extension dropped) equals `normalized`
    /// wins outright. Otherwise the first key, in insertion order, whose
    /// percent-encoded file name occurs anywhere in `normalized` is returned.
    /// Two files sharing a name in different folders are not told apart by the
    /// second rule.
    ///
    /// The exact-path rule is an addition on top of plain first-match
    /// containment: a link that names a file's full path resolves to that
    /// file even when an earlier key with the same file name would also
    /// contain. Links that only match by name resolve exactly as they would
    /// under containment alone.
    pub fn find_by_link_path(&self, normalized: &str) -> Option<&Location> {
        let decoded = percent_decode_str(normalized.trim_end_matches('/')).decode_utf8_lossy();
        let wanted = decoded.strip_suffix(".md").unwrap_or(&decoded);
        if let Some((_, location)) = self.entries.iter().find(|(path, _)| {
            let key = path.to_string_lossy();
            key.strip_suffix(".md").unwrap_or(&key) == wanted
        }) {
            return Some(location);
        }

        self.entries
            .iter()
            .find(|(path, _)| {
                encoded_file_name(path)
                    .map(|name| !name.is_empty() && normalized.contains(&name))
                    .unwrap_or(false)
            })
            .map(|(_, location)| location)
    }
}

fn encoded_file_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    Some(utf8_percent_encode(name, URI_COMPONENT).to_string())
}
