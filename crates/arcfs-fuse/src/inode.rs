//! Inode bookkeeping.
//!
//! FUSE addresses everything by inode; the engine addresses everything by
//! caller-visible path. This table is the bidirectional bridge between the
//! two namespaces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Reserved inode for the root directory.
pub const ROOT_INO: u64 = 1;

/// Bidirectional inode ↔ path map with monotone inode allocation.
pub struct InodeTable {
    path_to_ino: HashMap<PathBuf, u64>,
    ino_to_path: HashMap<u64, PathBuf>,
    next_ino: u64,
}

impl InodeTable {
    /// New table with the root directory pre-registered.
    pub fn new() -> Self {
        let mut table = InodeTable {
            path_to_ino: HashMap::new(),
            ino_to_path: HashMap::new(),
            next_ino: ROOT_INO + 1,
        };
        table.path_to_ino.insert(PathBuf::from("/"), ROOT_INO);
        table.ino_to_path.insert(ROOT_INO, PathBuf::from("/"));
        table
    }

    pub fn path(&self, ino: u64) -> Option<&Path> {
        self.ino_to_path.get(&ino).map(PathBuf::as_path)
    }

    pub fn ino(&self, path: &Path) -> Option<u64> {
        self.path_to_ino.get(path).copied()
    }

    /// Inode for `path`, allocating one on first sight.
    pub fn get_or_create(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.path_to_ino.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.path_to_ino.insert(path.to_path_buf(), ino);
        self.ino_to_path.insert(ino, path.to_path_buf());
        ino
    }

    /// Drop the mapping for `path` after unlink/rmdir.
    pub fn remove(&mut self, path: &Path) {
        if let Some(ino) = self.path_to_ino.remove(path) {
            self.ino_to_path.remove(&ino);
        }
    }

    /// Rewrite `old` — and everything registered beneath it — to `new`
    /// after a rename, keeping inode numbers stable.
    pub fn rename(&mut self, old: &Path, new: &Path) {
        let moved: Vec<(PathBuf, u64)> = self
            .path_to_ino
            .iter()
            .filter(|(path, _)| path.starts_with(old))
            .map(|(path, &ino)| (path.clone(), ino))
            .collect();
        for (path, ino) in moved {
            self.path_to_ino.remove(&path);
            let renamed = match path.strip_prefix(old) {
                Ok(suffix) if !suffix.as_os_str().is_empty() => new.join(suffix),
                _ => new.to_path_buf(),
            };
            self.ino_to_path.insert(ino, renamed.clone());
            self.path_to_ino.insert(renamed, ino);
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        InodeTable::new()
    }
}
