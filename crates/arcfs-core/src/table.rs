//! Mapping from archive files to their mount directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Maps real archive paths (and resolved directory entries inside mounted
/// archives) to real paths under the scratch mount root.
///
/// Entries are only ever added while the process runs; the table starts
/// empty on every start, and stale mount directories from earlier runs are
/// reclaimed by [`ScratchRoot::cleanup_stale`](crate::ScratchRoot::cleanup_stale).
#[derive(Debug, Default)]
pub struct MountTable {
    entries: HashMap<PathBuf, PathBuf>,
}

impl MountTable {
    pub fn new() -> Self {
        MountTable::default()
    }

    /// Whether `path` is already mapped.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&Path> {
        self.entries.get(path).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `path -> mounted`.
    pub fn insert(&mut self, path: PathBuf, mounted: PathBuf) {
        debug!(path = %path.display(), mounted = %mounted.display(), "mapping registered");
        self.entries.insert(path, mounted);
    }

    /// Redirect a candidate real path through the table.
    ///
    /// An exact match yields the mapped mount directory. Otherwise, if the
    /// candidate's parent is mapped, the candidate names an entry inside a
    /// mounted archive and is composed from the parent's mapping; composed
    /// paths that turn out to be directories are registered under the
    /// candidate so deeper lookups resolve in one step instead of re-walking
    /// the chain. Unrelated paths pass through untouched.
    pub fn redirect(&mut self, candidate: PathBuf) -> PathBuf {
        if let Some(mapped) = self.entries.get(&candidate) {
            return mapped.clone();
        }
        let composed = match (candidate.parent(), candidate.file_name()) {
            (Some(parent), Some(name)) => self
                .entries
                .get(parent)
                .map(|mapped_parent| mapped_parent.join(name)),
            _ => None,
        };
        match composed {
            Some(composed) => {
                if composed.is_dir() {
                    self.insert(candidate, composed.clone());
                }
                composed
            }
            None => candidate,
        }
    }
}
