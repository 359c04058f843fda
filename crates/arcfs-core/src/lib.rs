//! Core engine for ArcFS: virtual path resolution and lazy archive
//! mounting.
//!
//! A [`Mirror`] presents an existing directory tree and, on first
//! attribute query, transparently mounts `.rar`/`.zip` archives found in
//! it via external tools so their contents appear as subdirectories. The
//! FUSE layer lives in `arcfs-fuse`; nothing in this crate depends on it.

mod engine;
mod error;
mod mapper;
mod mounter;
mod scratch;
mod stat;
mod table;

pub use engine::{ListedEntry, Mirror, LISTED_SUFFIXES};
pub use error::EngineError;
pub use mapper::{map_to_real, relative_from};
pub use mounter::{ArchiveKind, MountCommand, ToolRunner};
pub use scratch::{scratch_dir_for, ScratchRoot, DEFAULT_STATE_BASE};
pub use stat::FileStat;
pub use table::MountTable;
