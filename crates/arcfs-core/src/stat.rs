//! File attributes as read from the host filesystem.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Snapshot of `lstat` results for a resolved path.
#[derive(Debug, Clone)]
pub struct FileStat {
    /// Full mode word, type bits included.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

fn system_time(secs: i64, nanos: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos as u32)
    } else {
        UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0)
    }
}

impl FileStat {
    pub fn from_metadata(md: &Metadata) -> Self {
        FileStat {
            mode: md.mode(),
            nlink: md.nlink() as u32,
            uid: md.uid(),
            gid: md.gid(),
            rdev: md.rdev(),
            size: md.size(),
            blocks: md.blocks(),
            atime: system_time(md.atime(), md.atime_nsec()),
            mtime: system_time(md.mtime(), md.mtime_nsec()),
            ctime: system_time(md.ctime(), md.ctime_nsec()),
        }
    }

    /// Whether the mode word describes a directory.
    pub fn is_dir(&self) -> bool {
        self.mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32
    }

    /// Present the entry as a directory: clear the regular-file bit, set the
    /// directory bit, leave the permission bits untouched. Used for archive
    /// files so they appear traversable even before mounting completes.
    pub fn present_as_directory(&mut self) {
        self.mode = (self.mode & !(libc::S_IFREG as u32)) | libc::S_IFDIR as u32;
    }
}
