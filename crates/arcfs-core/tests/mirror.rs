//! Integration tests for the resolution and lazy-mounting engine.
//!
//! The external tools are replaced by a recording fake that materializes a
//! fixed payload under the mount target, so mounting behavior is observable
//! without rar2fs/archivemount being installed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arcfs_core::{scratch_dir_for, ArchiveKind, EngineError, Mirror, MountCommand};
use tempfile::TempDir;

// ============== Test Helpers ==============

type Calls = Arc<Mutex<Vec<(ArchiveKind, PathBuf, PathBuf)>>>;

struct FakeTool {
    calls: Calls,
    payload: Vec<&'static str>,
    fail: bool,
}

impl MountCommand for FakeTool {
    fn mount(&self, kind: ArchiveKind, archive: &Path, target: &Path) -> io::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((kind, archive.to_path_buf(), target.to_path_buf()));
        if self.fail {
            return Err(io::Error::other("tool not installed"));
        }
        for entry in &self.payload {
            match entry.strip_suffix('/') {
                Some(dir) => fs::create_dir_all(target.join(dir))?,
                None => {
                    if let Some(parent) = Path::new(entry).parent() {
                        fs::create_dir_all(target.join(parent))?;
                    }
                    fs::write(target.join(entry), b"payload")?;
                }
            }
        }
        Ok(())
    }

    fn unmount(&self, _target: &Path) -> io::Result<()> {
        Ok(())
    }
}

struct Fixture {
    root: TempDir,
    _base: TempDir,
    mirror: Mirror,
    calls: Calls,
}

fn fixture_with(payload: Vec<&'static str>, fail: bool) -> Fixture {
    let root = TempDir::new().unwrap();
    let base = TempDir::new().unwrap();
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let tool = FakeTool {
        calls: calls.clone(),
        payload,
        fail,
    };
    let mirror = Mirror::new(root.path(), base.path(), Box::new(tool)).unwrap();
    Fixture {
        root,
        _base: base,
        mirror,
        calls,
    }
}

fn fixture() -> Fixture {
    fixture_with(vec!["track.mp3", "inner/", "inner/file.txt"], false)
}

// ============== Resolution ==============

#[test]
fn plain_paths_resolve_under_the_root() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("notes.txt"), b"x").unwrap();

    let resolved = fx.mirror.resolve(Path::new("/notes.txt"));
    assert_eq!(resolved, fx.root.path().join("notes.txt"));
    assert!(fx.calls.lock().unwrap().is_empty());
}

#[test]
fn missing_paths_still_resolve_syntactically() {
    let mut fx = fixture();
    let resolved = fx.mirror.resolve(Path::new("/no/such/thing"));
    assert_eq!(resolved, fx.root.path().join("no/such/thing"));
}

#[test]
fn stat_of_missing_path_is_not_found() {
    let mut fx = fixture();
    let err = fx.mirror.stat(Path::new("/absent.txt")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
}

// ============== Lazy mounting ==============

#[test]
fn repeated_archive_stats_mount_exactly_once() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("album.zip"), b"zipdata").unwrap();

    for _ in 0..3 {
        fx.mirror.stat(Path::new("/album.zip")).unwrap();
    }

    let calls = fx.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, ArchiveKind::Zip);
    assert_eq!(calls[0].1, fx.root.path().join("album.zip"));
}

#[test]
fn rar_archives_use_the_rar_tool() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("scene.rar"), b"rardata").unwrap();

    fx.mirror.stat(Path::new("/scene.rar")).unwrap();

    assert_eq!(fx.calls.lock().unwrap()[0].0, ArchiveKind::Rar);
}

#[test]
fn archive_stat_reports_a_directory() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("album.zip"), b"zipdata").unwrap();

    let first = fx.mirror.stat(Path::new("/album.zip")).unwrap();
    assert!(first.is_dir());

    let again = fx.mirror.stat(Path::new("/album.zip")).unwrap();
    assert!(again.is_dir());
}

#[test]
fn mount_targets_live_under_the_scratch_root() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("album.zip"), b"zipdata").unwrap();

    fx.mirror.stat(Path::new("/album.zip")).unwrap();

    let target = fx.calls.lock().unwrap()[0].2.clone();
    assert!(target.starts_with(fx.mirror.scratch_dir()));
}

#[test]
fn failed_mounts_are_not_retried() {
    let mut fx = fixture_with(vec![], true);
    fs::write(fx.root.path().join("broken.zip"), b"zipdata").unwrap();

    // The attempt is recorded anyway; the empty target is what callers see.
    let stat = fx.mirror.stat(Path::new("/broken.zip")).unwrap();
    assert!(stat.is_dir());
    assert_eq!(fx.mirror.mounted_count(), 1);

    fx.mirror.stat(Path::new("/broken.zip")).unwrap();
    assert_eq!(fx.calls.lock().unwrap().len(), 1);
}

#[test]
fn directories_named_like_archives_are_left_alone() {
    let mut fx = fixture();
    fs::create_dir(fx.root.path().join("folder.zip")).unwrap();

    let stat = fx.mirror.stat(Path::new("/folder.zip")).unwrap();
    assert!(stat.is_dir());
    assert!(fx.calls.lock().unwrap().is_empty());
}

// ============== Traversal into mounts ==============

#[test]
fn entries_inside_a_mounted_archive_resolve_into_its_target() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("album.zip"), b"zipdata").unwrap();
    fx.mirror.stat(Path::new("/album.zip")).unwrap();
    let target = fx.calls.lock().unwrap()[0].2.clone();

    assert_eq!(
        fx.mirror.resolve(Path::new("/album.zip/track.mp3")),
        target.join("track.mp3")
    );
    assert_eq!(
        fx.mirror.resolve(Path::new("/album.zip/inner")),
        target.join("inner")
    );
    assert_eq!(
        fx.mirror.resolve(Path::new("/album.zip/inner/file.txt")),
        target.join("inner/file.txt")
    );
}

#[test]
fn stat_works_through_a_mounted_archive() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("album.zip"), b"zipdata").unwrap();
    fx.mirror.stat(Path::new("/album.zip")).unwrap();

    let inner = fx.mirror.stat(Path::new("/album.zip/inner")).unwrap();
    assert!(inner.is_dir());

    let file = fx.mirror.stat(Path::new("/album.zip/inner/file.txt")).unwrap();
    assert!(!file.is_dir());
    assert_eq!(file.size, b"payload".len() as u64);
}

// ============== Directory listing ==============

fn names(entries: &[arcfs_core::ListedEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.name.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn listing_filters_out_unrelated_files() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("report.pdf"), b"x").unwrap();
    fs::write(fx.root.path().join("album.mp3"), b"x").unwrap();
    fs::write(fx.root.path().join("music.flac"), b"x").unwrap();

    let entries = fx.mirror.list_dir(Path::new("/")).unwrap();
    let mut listed = names(&entries);
    listed.sort();

    assert_eq!(listed, vec![".", "..", "album.mp3", "music.flac"]);
}

#[test]
fn listing_always_includes_directories() {
    let mut fx = fixture();
    fs::create_dir(fx.root.path().join("plain-folder")).unwrap();
    fs::write(fx.root.path().join("skipped.txt"), b"x").unwrap();

    let entries = fx.mirror.list_dir(Path::new("/")).unwrap();
    let listed = names(&entries);

    assert!(listed.contains(&"plain-folder".to_string()));
    assert!(!listed.contains(&"skipped.txt".to_string()));
}

#[test]
fn listing_a_mounted_archive_shows_its_contents() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("album.zip"), b"zipdata").unwrap();
    fx.mirror.stat(Path::new("/album.zip")).unwrap();

    let entries = fx.mirror.list_dir(Path::new("/album.zip")).unwrap();
    let listed = names(&entries);

    assert!(listed.contains(&"track.mp3".to_string()));
    assert!(listed.contains(&"inner".to_string()));
}

#[test]
fn listing_a_non_directory_yields_only_navigation_entries() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("album.mp3"), b"x").unwrap();

    let entries = fx.mirror.list_dir(Path::new("/album.mp3")).unwrap();
    assert_eq!(names(&entries), vec![".", ".."]);
}

// ============== Symlinks ==============

#[test]
fn absolute_link_targets_are_rewritten_relative_to_the_root() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("file.txt"), b"x").unwrap();
    std::os::unix::fs::symlink(
        fx.root.path().join("file.txt"),
        fx.root.path().join("abs-link"),
    )
    .unwrap();

    let target = fx.mirror.read_link(Path::new("/abs-link")).unwrap();
    assert_eq!(target, PathBuf::from("file.txt"));
}

#[test]
fn relative_link_targets_pass_through() {
    let mut fx = fixture();
    fs::write(fx.root.path().join("file.txt"), b"x").unwrap();
    std::os::unix::fs::symlink("file.txt", fx.root.path().join("rel-link")).unwrap();

    let target = fx.mirror.read_link(Path::new("/rel-link")).unwrap();
    assert_eq!(target, PathBuf::from("file.txt"));
}

// ============== Startup cleanup ==============

#[test]
fn stale_mount_directories_are_reclaimed_at_startup() {
    let root = TempDir::new().unwrap();
    let base = TempDir::new().unwrap();

    let scratch = scratch_dir_for(base.path(), root.path());
    fs::create_dir_all(scratch.join("stale-1")).unwrap();
    fs::create_dir_all(scratch.join("stale-2")).unwrap();

    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let tool = FakeTool {
        calls,
        payload: vec![],
        fail: false,
    };
    let mirror = Mirror::new(root.path(), base.path(), Box::new(tool)).unwrap();

    assert_eq!(fs::read_dir(mirror.scratch_dir()).unwrap().count(), 0);
}

// ============== Setup validation ==============

#[test]
fn missing_root_is_rejected() {
    let base = TempDir::new().unwrap();
    let err = Mirror::new(
        base.path().join("does-not-exist"),
        base.path(),
        Box::new(FakeTool {
            calls: Arc::new(Mutex::new(Vec::new())),
            payload: vec![],
            fail: false,
        }),
    )
    .unwrap_err();

    assert!(matches!(err, EngineError::RootNotADirectory(_)));
}
