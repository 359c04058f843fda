//! Conversions between engine attributes and kernel-visible forms.

use std::io;

use arcfs_core::FileStat;
use fuser::{FileAttr, FileType};
use libc::c_int;

/// File type encoded in a mode word.
pub fn file_type_of(mode: u32) -> FileType {
    match mode & libc::S_IFMT as u32 {
        m if m == libc::S_IFDIR as u32 => FileType::Directory,
        m if m == libc::S_IFLNK as u32 => FileType::Symlink,
        m if m == libc::S_IFCHR as u32 => FileType::CharDevice,
        m if m == libc::S_IFBLK as u32 => FileType::BlockDevice,
        m if m == libc::S_IFIFO as u32 => FileType::NamedPipe,
        m if m == libc::S_IFSOCK as u32 => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

/// Convert engine attributes into the form handed back to the kernel.
pub fn file_attr(stat: &FileStat, ino: u64) -> FileAttr {
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.blocks,
        atime: stat.atime,
        mtime: stat.mtime,
        ctime: stat.ctime,
        crtime: stat.ctime,
        kind: file_type_of(stat.mode),
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: stat.rdev as u32,
        blksize: 4096,
        flags: 0,
    }
}

/// Errno reported to the dispatch layer for an I/O error.
///
/// The raw OS error is authoritative when present; the `ErrorKind` fallback
/// only covers synthesized errors.
pub fn errno_of(err: &io::Error) -> c_int {
    if let Some(errno) = err.raw_os_error() {
        return errno;
    }
    match err.kind() {
        io::ErrorKind::NotFound => libc::ENOENT,
        io::ErrorKind::PermissionDenied => libc::EACCES,
        io::ErrorKind::AlreadyExists => libc::EEXIST,
        io::ErrorKind::InvalidInput => libc::EINVAL,
        io::ErrorKind::WouldBlock => libc::EAGAIN,
        _ => libc::EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn stat_with_mode(mode: u32) -> FileStat {
        FileStat {
            mode,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            rdev: 0,
            size: 42,
            blocks: 1,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
        }
    }

    #[test]
    fn mode_words_map_to_file_types() {
        assert_eq!(file_type_of(libc::S_IFDIR as u32 | 0o755), FileType::Directory);
        assert_eq!(file_type_of(libc::S_IFREG as u32 | 0o644), FileType::RegularFile);
        assert_eq!(file_type_of(libc::S_IFLNK as u32 | 0o777), FileType::Symlink);
    }

    #[test]
    fn permission_bits_survive_conversion() {
        let attr = file_attr(&stat_with_mode(libc::S_IFREG as u32 | 0o640), 7);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.size, 42);
        assert_eq!(attr.kind, FileType::RegularFile);
    }

    #[test]
    fn raw_os_errors_pass_through() {
        let err = io::Error::from_raw_os_error(libc::ENOTEMPTY);
        assert_eq!(errno_of(&err), libc::ENOTEMPTY);
    }

    #[test]
    fn synthesized_errors_fall_back_to_kind() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(errno_of(&err), libc::ENOENT);
        let err = io::Error::other("opaque");
        assert_eq!(errno_of(&err), libc::EIO);
    }
}
