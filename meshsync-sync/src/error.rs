//! Error types for meshsync-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that prevent a sync run from producing an outcome at all.
///
/// A tool that runs and fails is *not* an error: it yields a
/// [`crate::SyncOutcome`] with a non-clean exit category.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
