//! External archive-mount tools behind a synchronous command abstraction.

use std::io;
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

/// Archive formats handled by the external tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Rar,
    Zip,
}

impl ArchiveKind {
    /// Classify a path by its archive suffix. Matching is case-sensitive.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".rar") {
            Some(ArchiveKind::Rar)
        } else if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else {
            None
        }
    }

    /// Name of the external executable mounting this format.
    pub fn tool(self) -> &'static str {
        match self {
            ArchiveKind::Rar => "rar2fs",
            ArchiveKind::Zip => "archivemount",
        }
    }
}

/// Synchronous invocation of the external mount tools.
///
/// `mount` blocks until the tool returns, and the exit status is not
/// inspected for control flow: a failed mount leaves an empty or
/// inaccessible directory behind, and later operations against it surface
/// ordinary I/O errors. There is no timeout; a hung tool stalls the caller.
pub trait MountCommand: Send {
    /// Make `archive`'s contents appear under `target`.
    fn mount(&self, kind: ArchiveKind, archive: &Path, target: &Path) -> io::Result<()>;

    /// Detach a previously mounted `target`.
    fn unmount(&self, target: &Path) -> io::Result<()>;
}

/// Runs the real tools: `rar2fs`, `archivemount`, `fusermount -u`.
#[derive(Debug, Default)]
pub struct ToolRunner;

impl MountCommand for ToolRunner {
    fn mount(&self, kind: ArchiveKind, archive: &Path, target: &Path) -> io::Result<()> {
        debug!(tool = kind.tool(), archive = %archive.display(), "invoking mount tool");
        let status = Command::new(kind.tool()).arg(archive).arg(target).status()?;
        if !status.success() {
            warn!(tool = kind.tool(), archive = %archive.display(), %status, "mount tool failed");
        }
        Ok(())
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        let status = Command::new("fusermount").arg("-u").arg(target).status()?;
        if !status.success() {
            warn!(target = %target.display(), %status, "unmount failed");
        }
        Ok(())
    }
}
