//! The `fuser::Filesystem` implementation.
//!
//! Every handler resolves the caller-visible path through the engine, then
//! forwards to host OS primitives against the resolved real path. The
//! attribute handlers (`lookup`, `getattr`) are the mount trigger: statting
//! an archive for the first time mounts it as a side effect, so they must
//! run before anything else can observe a path.

use std::collections::HashMap;
use std::ffi::{CString, OsStr};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arcfs_core::Mirror;
use fuser::{
    Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use tracing::{debug, info, trace, warn};

use crate::convert::{errno_of, file_attr};
use crate::inode::{InodeTable, ROOT_INO};

/// The FUSE-facing filesystem: engine + inode table + open file handles.
pub struct ArcFs {
    /// The resolution and lazy-mounting engine.
    pub engine: Mirror,
    inodes: InodeTable,
    handles: HashMap<u64, File>,
    next_fh: u64,
    ttl: Duration,
}

impl ArcFs {
    pub fn new(engine: Mirror) -> Self {
        ArcFs {
            engine,
            inodes: InodeTable::new(),
            handles: HashMap::new(),
            next_fh: 1,
            ttl: Duration::from_secs(1),
        }
    }

    /// Mount at `mountpoint` and serve until unmounted. Blocks the calling
    /// thread; dispatch is single-threaded, so handlers never overlap.
    pub fn mount_foreground(self, mountpoint: &Path, allow_other: bool) -> io::Result<()> {
        let mut options = vec![
            MountOption::FSName("arcfs".to_string()),
            MountOption::AutoUnmount,
        ];
        if allow_other {
            options.push(MountOption::AllowOther);
        }
        info!(mountpoint = %mountpoint.display(), "mounting arcfs");
        fuser::mount2(self, mountpoint, &options)
    }

    fn vpath(&self, ino: u64) -> Option<PathBuf> {
        self.inodes.path(ino).map(Path::to_path_buf)
    }

    fn child(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.vpath(parent).map(|path| path.join(name))
    }

    fn alloc_fh(&mut self) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        fh
    }

    fn reply_entry_for(&mut self, path: &Path, reply: ReplyEntry) {
        match self.engine.stat(path) {
            Ok(stat) => {
                let ino = self.inodes.get_or_create(path);
                reply.entry(&self.ttl, &file_attr(&stat, ino), 0);
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }
}

fn cpath(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

fn timespec_of(time: Option<TimeOrNow>) -> libc::timespec {
    match time {
        None => libc::timespec {
            tv_sec: 0,
            tv_nsec: libc::UTIME_OMIT,
        },
        Some(TimeOrNow::Now) => libc::timespec {
            tv_sec: 0,
            tv_nsec: libc::UTIME_NOW,
        },
        Some(TimeOrNow::SpecificTime(at)) => {
            let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default();
            libc::timespec {
                tv_sec: since_epoch.as_secs() as libc::time_t,
                tv_nsec: since_epoch.subsec_nanos() as libc::c_long,
            }
        }
    }
}

fn set_times(path: &Path, atime: Option<TimeOrNow>, mtime: Option<TimeOrNow>) -> io::Result<()> {
    let c = cpath(path)?;
    let times = [timespec_of(atime), timespec_of(mtime)];
    let rc = unsafe {
        libc::utimensat(
            libc::AT_FDCWD,
            c.as_ptr(),
            times.as_ptr(),
            libc::AT_SYMLINK_NOFOLLOW,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn statvfs_of(path: &Path) -> io::Result<libc::statvfs> {
    let c = cpath(path)?;
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c.as_ptr(), &mut st) };
    if rc == 0 {
        Ok(st)
    } else {
        Err(io::Error::last_os_error())
    }
}

fn open_options(flags: i32) -> OpenOptions {
    let mut options = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => {
            options.write(true);
        }
        libc::O_RDWR => {
            options.read(true).write(true);
        }
        _ => {
            options.read(true);
        }
    }
    if flags & libc::O_APPEND != 0 {
        options.append(true);
    }
    if flags & libc::O_TRUNC != 0 {
        options.truncate(true);
    }
    options
}

impl Filesystem for ArcFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(root = %self.engine.root().display(), "arcfs session started");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("arcfs session ended");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        trace!("lookup(parent={}, name={:?})", parent, name);
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        self.reply_entry_for(&path, reply);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        trace!("getattr(ino={})", ino);
        let Some(path) = self.vpath(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.engine.stat(&path) {
            Ok(stat) => reply.attr(&self.ttl, &file_attr(&stat, ino)),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr(ino={}, mode={:?}, size={:?})", ino, mode, size);
        let Some(path) = self.vpath(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        let applied = (|| -> io::Result<()> {
            if let Some(mode) = mode {
                fs::set_permissions(&real, fs::Permissions::from_mode(mode))?;
            }
            if uid.is_some() || gid.is_some() {
                std::os::unix::fs::chown(&real, uid, gid)?;
            }
            if let Some(size) = size {
                OpenOptions::new().write(true).open(&real)?.set_len(size)?;
            }
            if atime.is_some() || mtime.is_some() {
                set_times(&real, atime, mtime)?;
            }
            Ok(())
        })();
        match applied.and_then(|_| self.engine.stat(&path)) {
            Ok(stat) => reply.attr(&self.ttl, &file_attr(&stat, ino)),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        trace!("readlink(ino={})", ino);
        let Some(path) = self.vpath(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.engine.read_link(&path) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        debug!("mknod(parent={}, name={:?}, mode={:o})", parent, name, mode);
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        let made = cpath(&real).and_then(|c| {
            let rc = unsafe { libc::mknod(c.as_ptr(), mode as libc::mode_t, rdev as libc::dev_t) };
            if rc == 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        });
        match made {
            Ok(()) => self.reply_entry_for(&path, reply),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir(parent={}, name={:?}, mode={:o})", parent, name, mode);
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        let mut builder = fs::DirBuilder::new();
        builder.mode(mode);
        match builder.create(&real) {
            Ok(()) => self.reply_entry_for(&path, reply),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink(parent={}, name={:?})", parent, name);
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        match fs::remove_file(&real) {
            Ok(()) => {
                self.inodes.remove(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir(parent={}, name={:?})", parent, name);
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        match fs::remove_dir(&real) {
            Ok(()) => {
                self.inodes.remove(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        link: &Path,
        reply: ReplyEntry,
    ) {
        debug!("symlink(parent={}, name={:?}, target={:?})", parent, name, link);
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        match std::os::unix::fs::symlink(link, &real) {
            Ok(()) => self.reply_entry_for(&path, reply),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(
            "rename(parent={}, name={:?}, newparent={}, newname={:?})",
            parent, name, newparent, newname
        );
        let Some(old) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(new) = self.child(newparent, newname) else {
            reply.error(libc::ENOENT);
            return;
        };
        let old_real = self.engine.resolve(&old);
        let new_real = self.engine.resolve(&new);
        match fs::rename(&old_real, &new_real) {
            Ok(()) => {
                self.inodes.rename(&old, &new);
                reply.ok();
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        debug!("link(ino={}, newparent={}, newname={:?})", ino, newparent, newname);
        let Some(source) = self.vpath(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(new) = self.child(newparent, newname) else {
            reply.error(libc::ENOENT);
            return;
        };
        let source_real = self.engine.resolve(&source);
        let new_real = self.engine.resolve(&new);
        match fs::hard_link(&source_real, &new_real) {
            Ok(()) => self.reply_entry_for(&new, reply),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open(ino={}, flags={:#x})", ino, flags);
        let Some(path) = self.vpath(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        match open_options(flags).open(&real) {
            Ok(file) => {
                let fh = self.alloc_fh();
                self.handles.insert(fh, file);
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("create(parent={}, name={:?}, mode={:o})", parent, name, mode);
        let Some(path) = self.child(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        let mut options = OpenOptions::new();
        options.write(true).create(true).mode(mode);
        let opened = options
            .open(&real)
            .and_then(|file| self.engine.stat(&path).map(|stat| (file, stat)));
        match opened {
            Ok((file, stat)) => {
                let ino = self.inodes.get_or_create(&path);
                let fh = self.alloc_fh();
                self.handles.insert(fh, file);
                reply.created(&self.ttl, &file_attr(&stat, ino), 0, fh, 0);
            }
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!("read(fh={}, offset={}, size={})", fh, offset, size);
        let Some(file) = self.handles.get_mut(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        let read = file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| file.read(&mut buf));
        match read {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!("write(fh={}, offset={}, len={})", fh, offset, data.len());
        let Some(file) = self.handles.get_mut(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let written = file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| file.write_all(data));
        match written {
            Ok(()) => reply.written(data.len() as u32),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        trace!("flush(fh={})", fh);
        let Some(file) = self.handles.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        match file.sync_all() {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!("release(fh={})", fh);
        if self.handles.remove(&fh).is_none() {
            warn!(fh, "release of unknown file handle");
        }
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        trace!("fsync(fh={}, datasync={})", fh, datasync);
        let Some(file) = self.handles.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let synced = if datasync {
            file.sync_data()
        } else {
            file.sync_all()
        };
        match synced {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!("readdir(ino={}, offset={})", ino, offset);
        let Some(path) = self.vpath(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.engine.list_dir(&path) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(errno_of(&e));
                return;
            }
        };
        let parent_ino = path
            .parent()
            .and_then(|parent| self.inodes.ino(parent))
            .unwrap_or(ROOT_INO);
        for (i, entry) in entries.iter().enumerate().skip(offset as usize) {
            let name = entry.name.as_os_str();
            let entry_ino = if name == "." {
                ino
            } else if name == ".." {
                parent_ino
            } else {
                self.inodes.get_or_create(&path.join(name))
            };
            let kind = if entry.is_dir {
                fuser::FileType::Directory
            } else {
                fuser::FileType::RegularFile
            };
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        trace!("statfs(ino={})", ino);
        let Some(path) = self.vpath(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        match statvfs_of(&real) {
            Ok(st) => reply.statfs(
                st.f_blocks as u64,
                st.f_bfree as u64,
                st.f_bavail as u64,
                st.f_files as u64,
                st.f_ffree as u64,
                st.f_bsize as u32,
                st.f_namemax as u32,
                st.f_frsize as u32,
            ),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        trace!("access(ino={}, mask={:#o})", ino, mask);
        let Some(path) = self.vpath(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let real = self.engine.resolve(&path);
        let checked = cpath(&real).and_then(|c| {
            let rc = unsafe { libc::access(c.as_ptr(), mask) };
            if rc == 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        });
        match checked {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_of(&e)),
        }
    }
}
