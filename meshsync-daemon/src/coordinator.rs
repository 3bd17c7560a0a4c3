//! Per-folder coordinator.
//!
//! One coordinator owns everything mutable about one synced folder: its
//! retry state, skip registry, debouncer and the single sync slot. It reacts
//! to four inputs (local filesystem events, peer notifications, the debounce
//! deadline and the retry deadline) plus completion of the in-flight sync.
//!
//! ```text
//! Bootstrapping ──▶ Syncing ──clean──▶ Idle ──debounce──▶ Syncing
//!                      │  ▲
//!               failure│  │retry deadline (or immediately)
//!                      ▼  │
//!                 RetryScheduled
//! ```

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use meshsync_core::paths::{
    baseline_marker_path, filter_file_path, folder_log_dir, BASELINE_MARKER,
};
use meshsync_core::{normalize_relative, ChangeKind, FolderSettings, HostEnv, Message};
use meshsync_sync::filters::write_filter_file;
use meshsync_sync::retention::prune_quietly;
use meshsync_sync::{ExitCategory, SyncError, SyncOutcome, SyncRequest, SyncTool};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;
use tokio::time::{sleep_until, Instant};

use crate::channel::NotificationChannel;
use crate::debounce::Debouncer;
use crate::error::{io_err, DaemonError};
use crate::retry::{RetryDecision, RetryState};
use crate::skip::SkipRegistry;
use crate::slot::TaskSlot;
use crate::watcher::{FolderWatch, FsEvent};

/// Suffix of files a transfer is still writing.
const PARTIAL_SUFFIX: &str = ".partial";

type SyncResult = Result<SyncOutcome, SyncError>;

// ---------------------------------------------------------------------------
// Folder context
// ---------------------------------------------------------------------------

/// Immutable per-folder facts derived from configuration and the host.
#[derive(Debug, Clone)]
pub struct FolderContext {
    pub hostname: String,
    pub settings: FolderSettings,
    /// Canonical local root; watcher paths are resolved against it.
    pub root: PathBuf,
    pub filter_file: PathBuf,
    pub log_dir: PathBuf,
    pub log_retention: usize,
}

impl FolderContext {
    pub fn new(env: &HostEnv, settings: FolderSettings, log_retention: usize) -> Self {
        let root = fs::canonicalize(&settings.local).unwrap_or_else(|_| settings.local.clone());
        Self {
            hostname: env.hostname.clone(),
            filter_file: filter_file_path(&env.home, &env.hostname, &settings.checksum),
            log_dir: folder_log_dir(&env.home, &settings.checksum),
            root,
            settings,
            log_retention,
        }
    }

    /// Short id used in log lines.
    pub fn nick(&self) -> &str {
        self.settings.checksum.nick()
    }

    /// Rewrite the filter file and make sure the run-log directory exists.
    pub fn prepare(&self) -> Result<(), DaemonError> {
        fs::create_dir_all(&self.log_dir).map_err(|e| io_err(&self.log_dir, e))?;
        write_filter_file(&self.filter_file, &self.settings.filters)?;
        Ok(())
    }

    pub fn marker(&self) -> PathBuf {
        baseline_marker_path(&self.settings.local)
    }

    pub fn has_baseline(&self) -> bool {
        self.marker().exists()
    }

    pub fn request(&self, resync: bool) -> SyncRequest {
        SyncRequest {
            local: self.settings.local.clone(),
            remote: self.settings.remote.clone(),
            filter_file: self.filter_file.clone(),
            resync,
            log_dir: self.log_dir.clone(),
        }
    }

    /// Folder-relative, `/`-separated form of `path`, or `None` for paths
    /// outside the folder and the folder itself.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let relative = path
            .strip_prefix(&self.root)
            .or_else(|_| path.strip_prefix(&self.settings.local))
            .ok()?;
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let normalized = normalize_relative(&joined);
        (!normalized.is_empty()).then_some(normalized)
    }

    fn set_baseline(&self, present: bool) {
        let marker = self.marker();
        let result = if present {
            fs::write(&marker, b"")
        } else {
            match fs::remove_file(&marker) {
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            }
        };
        if let Err(err) = result {
            tracing::warn!(
                folder = self.nick(),
                path = %marker.display(),
                error = %err,
                "failed to update baseline marker",
            );
        }
    }
}

fn is_ignored_path(relative: &str) -> bool {
    relative == BASELINE_MARKER || relative.ends_with(PARTIAL_SUFFIX)
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Bootstrapping,
    Idle,
    Syncing,
    RetryScheduled,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorState::Bootstrapping => write!(f, "bootstrapping"),
            CoordinatorState::Idle => write!(f, "idle"),
            CoordinatorState::Syncing => write!(f, "syncing"),
            CoordinatorState::RetryScheduled => write!(f, "retry scheduled"),
        }
    }
}

pub struct FolderCoordinator {
    ctx: Arc<FolderContext>,
    tool: Arc<dyn SyncTool>,
    channel: NotificationChannel,
    state: CoordinatorState,
    skips: SkipRegistry,
    retry: RetryState,
    debouncer: Debouncer,
    slot: TaskSlot<SyncResult>,
    retry_at: Option<Instant>,
    rerun_pending: bool,
}

impl FolderCoordinator {
    pub fn new(ctx: FolderContext, tool: Arc<dyn SyncTool>, channel: NotificationChannel) -> Self {
        let retry = RetryState::new(!ctx.has_baseline());
        let debouncer = Debouncer::new(ctx.settings.debounce);
        Self {
            ctx: Arc::new(ctx),
            tool,
            channel,
            state: CoordinatorState::Bootstrapping,
            skips: SkipRegistry::new(),
            retry,
            debouncer,
            slot: TaskSlot::new(),
            retry_at: None,
            rerun_pending: false,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Run until `abort` fires or the notification stream ends.
    ///
    /// The first sync is awaited before the watch starts. On abort, no new
    /// work is accepted and the in-flight sync is allowed to finish. A closed
    /// `inbound` means the bus connection is gone and is reported as
    /// [`DaemonError::ConnectionLost`].
    pub async fn run<W: FolderWatch>(
        mut self,
        watch: W,
        mut inbound: mpsc::UnboundedReceiver<Message>,
        mut abort: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        self.ctx.prepare()?;
        tracing::info!(
            folder = self.ctx.nick(),
            remote = %self.ctx.settings.remote,
            local = %self.ctx.settings.local.display(),
            resync = self.retry.resync_required,
            "startup sync",
        );
        self.start_sync();

        let first = tokio::select! {
            _ = abort.recv() => {
                self.drain().await;
                return Ok(());
            }
            result = self.slot.finished() => result,
        };
        self.on_sync_finished(first).await?;

        let (_guard, mut events) = watch.start(&self.ctx.root)?;
        tracing::info!(folder = self.ctx.nick(), root = %self.ctx.root.display(), "watching folder");

        loop {
            tokio::select! {
                _ = abort.recv() => break,
                event = events.recv() => match event {
                    Some(event) => self.on_fs_event(event).await,
                    None => return Err(DaemonError::ChannelClosed("filesystem watch")),
                },
                message = inbound.recv() => match message {
                    Some(message) => self.on_peer_message(message),
                    None => {
                        self.drain().await;
                        return Err(DaemonError::ConnectionLost(format!(
                            "notification stream for folder {} ended",
                            self.ctx.nick()
                        )));
                    }
                },
                _ = self.debouncer.fired() => self.on_debounce_fired(),
                _ = retry_deadline(self.retry_at) => {
                    self.retry_at = None;
                    tracing::info!(folder = self.ctx.nick(), resync = self.retry.resync_required, "retrying sync");
                    self.start_sync();
                }
                result = self.slot.finished() => self.on_sync_finished(result).await?,
            }
        }

        tracing::info!(folder = self.ctx.nick(), "stopping coordinator");
        self.drain().await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    async fn on_fs_event(&mut self, event: FsEvent) {
        let Some(kind) = event.kind.change_kind() else {
            return;
        };
        let Some(relative) = self.ctx.relative(&event.path) else {
            return;
        };
        if is_ignored_path(&relative) {
            tracing::trace!(folder = self.ctx.nick(), path = %relative, "ignored path");
            return;
        }
        if kind != ChangeKind::Remove
            && self.tool.excludes(&event.path, &self.ctx.filter_file).await
        {
            tracing::debug!(folder = self.ctx.nick(), path = %relative, "excluded by filters");
            return;
        }
        if self.skips.consume(kind, &relative) {
            tracing::debug!(
                folder = self.ctx.nick(),
                kind = %kind,
                path = %relative,
                "suppressed event caused by peer sync",
            );
            return;
        }

        tracing::debug!(folder = self.ctx.nick(), kind = %kind, path = %relative, "local change");
        self.debouncer.arm();
    }

    fn on_peer_message(&mut self, message: Message) {
        tracing::info!(
            folder = self.ctx.nick(),
            from = %message.hostname,
            changes = %message.changeset,
            "peer notification received",
        );
        self.skips.seed(&message.changeset);
        self.debouncer.arm();
    }

    fn on_debounce_fired(&mut self) {
        if self.retry_at.is_some() {
            // The scheduled retry runs a full sync anyway.
            tracing::debug!(folder = self.ctx.nick(), "trigger folded into scheduled retry");
            return;
        }
        if self.slot.is_busy() {
            tracing::debug!(folder = self.ctx.nick(), "sync in flight; rerun queued");
            self.rerun_pending = true;
            return;
        }
        self.start_sync();
    }

    // -----------------------------------------------------------------------
    // Sync lifecycle
    // -----------------------------------------------------------------------

    fn start_sync(&mut self) {
        let request = self.ctx.request(self.retry.resync_required);
        let tool = self.tool.clone();
        if self.slot.start(async move { tool.run(&request).await }) {
            tracing::debug!(
                folder = self.ctx.nick(),
                resync = self.retry.resync_required,
                "sync started",
            );
            self.state = CoordinatorState::Syncing;
        } else {
            self.rerun_pending = true;
        }
    }

    async fn on_sync_finished(
        &mut self,
        result: Result<SyncResult, JoinError>,
    ) -> Result<(), DaemonError> {
        prune_quietly(&self.ctx.log_dir, self.ctx.log_retention);

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::warn!(folder = self.ctx.nick(), error = %err, "sync could not run");
                self.on_failure(ExitCategory::MinorError);
                return Ok(());
            }
            Err(err) => {
                tracing::error!(folder = self.ctx.nick(), error = %err, "sync task failed");
                self.on_failure(ExitCategory::MinorError);
                return Ok(());
            }
        };

        if outcome.category != ExitCategory::Clean {
            tracing::warn!(
                folder = self.ctx.nick(),
                category = %outcome.category,
                exit_code = ?outcome.exit_code,
                log = %outcome.log_path.display(),
                "sync failed",
            );
            self.on_failure(outcome.category);
            return Ok(());
        }

        self.retry.record_success();
        self.retry_at = None;
        self.ctx.set_baseline(true);
        tracing::info!(
            folder = self.ctx.nick(),
            changed = outcome.changed,
            changes = %outcome.changeset,
            "sync succeeded",
        );

        if outcome.changed {
            self.channel.publish(&outcome.changeset).await?;
            tracing::info!(folder = self.ctx.nick(), changes = %outcome.changeset, "notified peers");
        }

        self.state = CoordinatorState::Idle;
        if std::mem::take(&mut self.rerun_pending) {
            self.debouncer.arm();
        }
        Ok(())
    }

    fn on_failure(&mut self, category: ExitCategory) {
        if category == ExitCategory::FatalError {
            self.ctx.set_baseline(false);
        }
        // The retry covers anything queued behind the failed run.
        self.rerun_pending = false;

        match self.retry.record_failure(category) {
            RetryDecision::Immediate => {
                tracing::warn!(
                    folder = self.ctx.nick(),
                    resync = self.retry.resync_required,
                    "retrying immediately",
                );
                self.start_sync();
            }
            RetryDecision::After(wait) => {
                tracing::warn!(
                    folder = self.ctx.nick(),
                    failures = self.retry.consecutive_failures,
                    wait_ms = wait.as_millis() as u64,
                    resync = self.retry.resync_required,
                    "retry scheduled",
                );
                self.retry_at = Some(Instant::now() + wait);
                self.state = CoordinatorState::RetryScheduled;
            }
        }
    }

    /// Let the in-flight sync finish without scheduling follow-up work. Its
    /// changes are still announced while the bus allows it.
    async fn drain(&mut self) {
        self.debouncer.cancel();
        self.retry_at = None;
        if !self.slot.is_busy() {
            return;
        }
        tracing::info!(folder = self.ctx.nick(), "waiting for in-flight sync");
        match self.slot.finished().await {
            Ok(Ok(outcome)) => {
                match outcome.category {
                    ExitCategory::Clean => self.ctx.set_baseline(true),
                    ExitCategory::FatalError => self.ctx.set_baseline(false),
                    ExitCategory::MinorError => {}
                }
                tracing::info!(folder = self.ctx.nick(), category = %outcome.category, "in-flight sync finished");
                if outcome.category == ExitCategory::Clean && outcome.changed {
                    match self.channel.publish(&outcome.changeset).await {
                        Ok(()) => {
                            tracing::info!(folder = self.ctx.nick(), changes = %outcome.changeset, "notified peers")
                        }
                        Err(err) => {
                            tracing::warn!(folder = self.ctx.nick(), error = %err, "could not notify peers")
                        }
                    }
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(folder = self.ctx.nick(), error = %err, "in-flight sync could not run")
            }
            Err(err) => {
                tracing::error!(folder = self.ctx.nick(), error = %err, "in-flight sync task failed")
            }
        }
        prune_quietly(&self.ctx.log_dir, self.ctx.log_retention);
    }
}

async fn retry_deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
