use std::io;
use std::path::PathBuf;

/// Errors raised while building a [`Mirror`](crate::Mirror).
///
/// Per-operation failures stay plain [`std::io::Error`]s so they map
/// directly onto host error codes at the FUSE boundary.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The mirrored root does not exist or is not a directory.
    #[error("mirrored root is not a directory: {}", .0.display())]
    RootNotADirectory(PathBuf),

    /// The scratch mount root could not be created.
    #[error("cannot create scratch mount root at {}", path.display())]
    ScratchRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other I/O failure during setup.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
