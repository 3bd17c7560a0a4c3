use std::sync::Arc;

use meshsync_core::{Config, HostEnv};
use meshsync_sync::RcloneExecutor;
use tokio::sync::broadcast;

use crate::bus::amqp::AmqpConnector;
use crate::error::{io_err, DaemonError};
use crate::orchestrator::Orchestrator;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: Config, json: bool) -> Result<(), DaemonError> {
    init_tracing(json);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon until Ctrl-C.
///
/// An unresolvable hostname or home directory is logged and no folders start.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    let env = match HostEnv::detect() {
        Ok(env) => env,
        Err(err) => {
            tracing::error!(error = %err, "host environment unavailable; no folders started");
            return Ok(());
        }
    };
    tracing::info!(host = %env.hostname, connection = ?config.connection, "starting meshsync");

    let connector = Arc::new(AmqpConnector::new(config.connection.amqp_uri()));
    let tool = Arc::new(RcloneExecutor::new(config.tool()));
    let orchestrator = Orchestrator::new(config, env, connector, tool);

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => {}
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => tracing::info!("received ctrl-c, shutting down"),
                        Err(err) => tracing::error!(error = %err, "ctrl-c handler failed; shutting down"),
                    }
                    let _ = shutdown.send(());
                }
            }
        })
    };

    let result = orchestrator.run(shutdown_tx.clone()).await;
    let _ = shutdown_tx.send(());
    signal_handle
        .await
        .map_err(|err| DaemonError::Join(format!("signal handler: {err}")))?;
    result
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
