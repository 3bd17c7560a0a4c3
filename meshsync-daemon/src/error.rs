use std::path::PathBuf;

use thiserror::Error;

use crate::bus::BusError;

/// Error surface for coordinators, the bus layer and the runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Core(#[from] meshsync_core::CoreError),

    #[error("sync error: {0}")]
    Sync(#[from] meshsync_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("bus connection lost: {0}")]
    ConnectionLost(String),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("task join failure: {0}")]
    Join(String),
}

impl DaemonError {
    /// Failures of the bus connection itself, as opposed to a single folder.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DaemonError::Bus(_) | DaemonError::ConnectionLost(_))
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
