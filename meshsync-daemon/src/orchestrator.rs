//! Host-level supervisor: one bus connection, one coordinator per folder,
//! and a fixed-wait reconnect loop that rebuilds everything from scratch.
//!
//! A coordinator only stops on its own when something is wrong with its
//! folder (missing root, unwritable metadata). That ends the session too, so
//! the folder is retried with everything else after the same wait.

use std::sync::Arc;
use std::time::Duration;

use meshsync_core::{Config, FolderSettings, HostEnv};
use meshsync_sync::SyncTool;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::bus::{BusConnection, BusConnector};
use crate::channel::NotificationChannel;
use crate::coordinator::{FolderContext, FolderCoordinator};
use crate::error::{io_err, DaemonError};
use crate::watcher::NotifyWatch;

pub const RECONNECT_WAIT: Duration = Duration::from_secs(60);

enum SessionEnd {
    Shutdown,
    ConnectionLost(String),
    FolderFailed(DaemonError),
}

pub struct Orchestrator {
    config: Config,
    env: HostEnv,
    connector: Arc<dyn BusConnector>,
    tool: Arc<dyn SyncTool>,
    reconnect_wait: Duration,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        env: HostEnv,
        connector: Arc<dyn BusConnector>,
        tool: Arc<dyn SyncTool>,
    ) -> Self {
        Self {
            config,
            env,
            connector,
            tool,
            reconnect_wait: RECONNECT_WAIT,
        }
    }

    pub fn with_reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait = wait;
        self
    }

    /// Run until `shutdown` fires. Connection failures are retried forever.
    ///
    /// A host missing from the configuration is logged and returns `Ok`
    /// without starting anything.
    pub async fn run(&self, shutdown: broadcast::Sender<()>) -> Result<(), DaemonError> {
        let mut shutdown_rx = shutdown.subscribe();

        let folders = match self.config.folders_for(&self.env.hostname) {
            Ok(folders) => folders,
            Err(err) => {
                tracing::error!(host = %self.env.hostname, error = %err, "no folders started");
                return Ok(());
            }
        };

        let root = self.env.metadata_root();
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

        loop {
            match self.session(&folders, &mut shutdown_rx).await {
                SessionEnd::Shutdown => break,
                SessionEnd::ConnectionLost(reason) => {
                    tracing::warn!(
                        reason = %reason,
                        wait_secs = self.reconnect_wait.as_secs(),
                        "bus connection lost; reconnecting after wait",
                    );
                }
                SessionEnd::FolderFailed(err) => {
                    tracing::error!(
                        error = %err,
                        wait_secs = self.reconnect_wait.as_secs(),
                        "folder coordinator stopped; restarting after wait",
                    );
                }
            }

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(self.reconnect_wait) => {}
            }
        }

        tracing::info!(host = %self.env.hostname, "orchestrator stopped");
        Ok(())
    }

    /// One connection lifetime: connect, start every folder, wait for
    /// shutdown or a connection-level failure, then tear everything down.
    async fn session(
        &self,
        folders: &[FolderSettings],
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        let connection = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(err) => return SessionEnd::ConnectionLost(err.to_string()),
        };
        tracing::info!(host = %self.env.hostname, folders = folders.len(), "connected to bus");

        let (abort_tx, _) = broadcast::channel::<()>(1);
        let mut tasks = JoinSet::new();
        for settings in folders {
            let ctx = FolderContext::new(&self.env, settings.clone(), self.config.log_retention());
            tasks.spawn(run_folder(
                ctx,
                connection.clone(),
                self.tool.clone(),
                abort_tx.subscribe(),
            ));
        }

        let end = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break SessionEnd::Shutdown,
                _ = connection.closed() => {
                    break SessionEnd::ConnectionLost("connection closed by broker".to_string())
                }
                joined = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Some(Ok(Err(err))) if err.is_connection_error() => {
                        break SessionEnd::ConnectionLost(err.to_string())
                    }
                    Some(Ok(Err(err))) => break SessionEnd::FolderFailed(err),
                    Some(Err(err)) => {
                        break SessionEnd::FolderFailed(DaemonError::Join(err.to_string()))
                    }
                    Some(Ok(Ok(()))) | None => {}
                },
            }
        };

        let _ = abort_tx.send(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Err(err)) => tracing::debug!(error = %err, "coordinator ended during teardown"),
                Err(err) => tracing::debug!(error = %err, "coordinator task ended during teardown"),
                Ok(Ok(())) => {}
            }
        }
        connection.close().await;
        end
    }
}

async fn run_folder(
    ctx: FolderContext,
    connection: Arc<dyn BusConnection>,
    tool: Arc<dyn SyncTool>,
    abort: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let channel =
        NotificationChannel::open(&*connection, &ctx.hostname, &ctx.settings.checksum)
            .await?;
    let inbound = channel.subscribe().await?;
    FolderCoordinator::new(ctx, tool, channel)
        .run(NotifyWatch, inbound, abort)
        .await
}
