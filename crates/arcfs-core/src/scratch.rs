//! Per-root scratch directory holding archive mount points.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::mounter::MountCommand;

/// Default runtime-state location for scratch mount roots.
pub const DEFAULT_STATE_BASE: &str = "/var/run/archmnt";

/// Scratch root location for a given mirrored root.
///
/// The mirrored root's absolute path is appended to `base`, so instances
/// mirroring different roots never collide.
pub fn scratch_dir_for(base: &Path, mirror_root: &Path) -> PathBuf {
    let tail = mirror_root.strip_prefix("/").unwrap_or(mirror_root);
    base.join(tail)
}

/// Runtime-state directory holding one mount directory per archive.
#[derive(Debug)]
pub struct ScratchRoot {
    dir: PathBuf,
}

impl ScratchRoot {
    /// Create (if needed) the scratch root for `mirror_root` under `base`.
    pub fn create(base: &Path, mirror_root: &Path) -> io::Result<Self> {
        let dir = scratch_dir_for(base, mirror_root);
        fs::create_dir_all(&dir)?;
        Ok(ScratchRoot { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Make a fresh, uniquely named mount directory, readable and
    /// traversable by group and others.
    pub fn make_mount_dir(&self) -> io::Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("mnt-")
            .tempdir_in(&self.dir)?
            .keep();
        let mut perms = fs::metadata(&dir)?.permissions();
        perms.set_mode(perms.mode() | 0o055);
        fs::set_permissions(&dir, perms)?;
        Ok(dir)
    }

    /// Best-effort removal of mount directories left by a previous run.
    ///
    /// Each entry is unmounted and then removed. Failures are logged and
    /// swallowed so a half-dead leftover never prevents startup.
    pub fn cleanup_stale(&self, mounter: &dyn MountCommand) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot scan scratch mount root");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            info!(path = %path.display(), "reclaiming stale mount directory");
            if let Err(e) = mounter.unmount(&path) {
                warn!(path = %path.display(), error = %e, "stale unmount failed");
            }
            if let Err(e) = fs::remove_dir(&path) {
                warn!(path = %path.display(), error = %e, "stale removal failed");
            }
        }
    }
}
