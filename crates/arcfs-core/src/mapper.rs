//! Virtual-to-real path mapping.

use std::path::{Component, Path, PathBuf};

/// Map a caller-visible path onto the mirrored root.
///
/// Strips a single leading separator and joins the remainder onto `root`.
/// Purely syntactic: the result is not checked for existence.
pub fn map_to_real(root: &Path, path: &Path) -> PathBuf {
    let relative = path.strip_prefix("/").unwrap_or(path);
    root.join(relative)
}

/// Express `path` relative to `base`, walking up with `..` where needed.
///
/// Used when reading symlinks: an absolute target under `base` becomes a
/// plain relative path, anything else gains leading `..` components, so the
/// target stays meaningful when followed through the mount point.
pub fn relative_from(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part);
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}
