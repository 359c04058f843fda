//! The resolution and lazy archive-mounting engine.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::EngineError;
use crate::mapper::{map_to_real, relative_from};
use crate::mounter::{ArchiveKind, MountCommand};
use crate::scratch::{scratch_dir_for, ScratchRoot};
use crate::stat::FileStat;
use crate::table::MountTable;

/// Suffixes admitted by directory listings alongside directories
/// themselves. Presentation policy, not a correctness rule; matching is
/// case-sensitive, which is why some entries appear in several spellings.
pub const LISTED_SUFFIXES: &[&str] = &[
    ".aac", ".ac3", ".ape", ".dts", ".flac", ".iso", ".ISO", ".it", ".m4a",
    ".mid", ".mod", ".mp3", ".Mp3", ".MP3", ".mpc", ".nrg", ".ogg", ".ra",
    ".RA", ".ram", ".rar", ".s3m", ".vgz", ".wav", ".WAV", ".wma", ".wv",
    ".wvc", ".zip",
];

/// One name from a filtered directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: OsString,
    pub is_dir: bool,
}

impl ListedEntry {
    fn dot(name: &str) -> Self {
        ListedEntry {
            name: OsString::from(name),
            is_dir: true,
        }
    }
}

/// Mirrors a directory tree, transparently mounting archives found inside
/// it the first time their attributes are queried.
///
/// One instance owns all mutable state: the mount table and the scratch
/// mount root. Running two instances over the same root is unsupported;
/// their scratch roots would coincide.
pub struct Mirror {
    root: PathBuf,
    scratch: ScratchRoot,
    table: MountTable,
    mounter: Box<dyn MountCommand>,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("root", &self.root)
            .field("scratch", &self.scratch)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl Mirror {
    /// Build a mirror of `root`, keeping archive mounts under `state_base`.
    ///
    /// Reclaims stale mount directories from a previous run before anything
    /// else touches the scratch root.
    pub fn new(
        root: impl AsRef<Path>,
        state_base: impl AsRef<Path>,
        mounter: Box<dyn MountCommand>,
    ) -> Result<Self, EngineError> {
        let root = std::path::absolute(root.as_ref())?;
        if !root.is_dir() {
            return Err(EngineError::RootNotADirectory(root));
        }
        let scratch =
            ScratchRoot::create(state_base.as_ref(), &root).map_err(|source| {
                EngineError::ScratchRoot {
                    path: scratch_dir_for(state_base.as_ref(), &root),
                    source,
                }
            })?;
        scratch.cleanup_stale(mounter.as_ref());
        info!(root = %root.display(), scratch = %scratch.path().display(), "mirror ready");
        Ok(Mirror {
            root,
            scratch,
            table: MountTable::new(),
            mounter,
        })
    }

    /// The mirrored root, absolute.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The scratch mount root backing this mirror.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// How many mount mappings are currently registered.
    pub fn mounted_count(&self) -> usize {
        self.table.len()
    }

    /// Resolve a caller-visible path to the real path it denotes, following
    /// the mount table across archive boundaries.
    pub fn resolve(&mut self, path: &Path) -> PathBuf {
        self.table.redirect(map_to_real(&self.root, path))
    }

    /// Attributes for a caller-visible path.
    ///
    /// This is the operation that drives lazy mounting: the first query for
    /// an archive file creates its mount directory, runs the external tool,
    /// and records the mapping, after which the returned attributes describe
    /// the mount directory. Until then (or if mounting failed), the archive
    /// is still reported with directory type bits so it stays traversable.
    ///
    /// The table alone decides "already mounted"; a tool mount torn down
    /// out-of-band is not detected, and no second attempt is made.
    pub fn stat(&mut self, path: &Path) -> io::Result<FileStat> {
        let real = self.resolve(path);
        let mut stat = FileStat::from_metadata(&fs::symlink_metadata(&real)?);
        if let Some(kind) = ArchiveKind::from_path(path) {
            if !real.is_dir() {
                stat.present_as_directory();
                if !self.table.contains(&real) {
                    self.mount_archive(kind, &real)?;
                }
            }
        }
        if let Some(mounted) = self.table.get(&real) {
            stat = FileStat::from_metadata(&fs::symlink_metadata(mounted)?);
        }
        Ok(stat)
    }

    fn mount_archive(&mut self, kind: ArchiveKind, archive: &Path) -> io::Result<()> {
        let target = self.scratch.make_mount_dir()?;
        info!(archive = %archive.display(), target = %target.display(), "mounting archive");
        if let Err(e) = self.mounter.mount(kind, archive, &target) {
            warn!(archive = %archive.display(), error = %e, "mount tool could not be run");
        }
        // Registered even when the tool failed: one attempt per archive per
        // process lifetime, later accesses see the directory as-is.
        self.table.insert(archive.to_path_buf(), target);
        Ok(())
    }

    /// Filtered listing of a directory: `.` and `..` always, then every
    /// subdirectory, then files whose names end in a recognized suffix.
    /// Listing something that is not a directory yields just the two
    /// navigation entries.
    pub fn list_dir(&mut self, path: &Path) -> io::Result<Vec<ListedEntry>> {
        let real = self.resolve(path);
        let mut entries = vec![ListedEntry::dot("."), ListedEntry::dot("..")];
        if !real.is_dir() {
            return Ok(entries);
        }
        for entry in fs::read_dir(&real)? {
            let entry = entry?;
            let name = entry.file_name();
            if entry.path().is_dir() {
                entries.push(ListedEntry { name, is_dir: true });
            } else if has_listed_suffix(name.as_bytes()) {
                entries.push(ListedEntry {
                    name,
                    is_dir: false,
                });
            }
        }
        Ok(entries)
    }

    /// Target of a symlink. Absolute targets are rewritten relative to the
    /// mirrored root so they stay valid when followed through the mount
    /// point; relative targets pass through unchanged.
    pub fn read_link(&mut self, path: &Path) -> io::Result<PathBuf> {
        let real = self.resolve(path);
        let target = fs::read_link(&real)?;
        if target.is_absolute() {
            Ok(relative_from(&target, &self.root))
        } else {
            Ok(target)
        }
    }
}

fn has_listed_suffix(name: &[u8]) -> bool {
    LISTED_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix.as_bytes()))
}
