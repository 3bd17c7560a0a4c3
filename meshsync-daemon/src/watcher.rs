//! Recursive filesystem watch over a synced folder.
//!
//! [`NotifyWatch`] is the real implementation; [`ChannelWatch`] replays
//! events pushed by a test.

use std::path::{Path, PathBuf};

use meshsync_core::ChangeKind;
use notify::event::{EventKind, ModifyKind};
use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Create,
    Modify,
    Remove,
    Other,
}

impl FsEventKind {
    pub fn change_kind(self) -> Option<ChangeKind> {
        match self {
            FsEventKind::Create => Some(ChangeKind::Create),
            FsEventKind::Modify => Some(ChangeKind::Modify),
            FsEventKind::Remove => Some(ChangeKind::Remove),
            FsEventKind::Other => None,
        }
    }
}

impl From<&EventKind> for FsEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => FsEventKind::Create,
            // Metadata-only updates (atime, permissions) are not content changes.
            EventKind::Modify(ModifyKind::Metadata(_)) => FsEventKind::Other,
            EventKind::Modify(_) => FsEventKind::Modify,
            EventKind::Remove(_) => FsEventKind::Remove,
            _ => FsEventKind::Other,
        }
    }
}

/// One path-level filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Source of filesystem events for one folder. The guard keeps the watch
/// alive; dropping it stops delivery.
pub trait FolderWatch: Send + 'static {
    type Guard: Send;

    fn start(self, root: &Path)
        -> Result<(Self::Guard, mpsc::UnboundedReceiver<FsEvent>), DaemonError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatch;

impl FolderWatch for NotifyWatch {
    type Guard = RecommendedWatcher;

    fn start(
        self,
        root: &Path,
    ) -> Result<(Self::Guard, mpsc::UnboundedReceiver<FsEvent>), DaemonError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| match event {
            Ok(event) => {
                let kind = FsEventKind::from(&event.kind);
                for path in event.paths {
                    let _ = tx.send(FsEvent { kind, path });
                }
            }
            Err(err) => tracing::warn!(error = %err, "watcher event error"),
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok((watcher, rx))
    }
}

/// Events come from a channel held by the caller.
#[derive(Debug)]
pub struct ChannelWatch(pub mpsc::UnboundedReceiver<FsEvent>);

impl ChannelWatch {
    pub fn pair() -> (mpsc::UnboundedSender<FsEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self(rx))
    }
}

impl FolderWatch for ChannelWatch {
    type Guard = ();

    fn start(
        self,
        _root: &Path,
    ) -> Result<(Self::Guard, mpsc::UnboundedReceiver<FsEvent>), DaemonError> {
        Ok(((), self.0))
    }
}
