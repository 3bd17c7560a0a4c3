//! Subprocess execution of `rclone bisync`.
//!
//! ## Run protocol
//!
//! 1. Create the folder's log directory and a timestamped log file.
//! 2. Spawn the tool non-interactively (stdin is `/dev/null`).
//! 3. Stream stdout and stderr into the log as raw bytes as they arrive.
//! 4. Wait for exit, classify the code, interpret the captured log.
//!
//! Any failure after spawn kills and reaps the tool before returning.
//!
//! The log file is the only durable audit trail, so it is written before
//! anything can fail and is kept whatever the exit status.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::{io_err, SyncError};
use crate::interpreter::{BisyncLog, LogInterpreter};
use crate::outcome::{SyncOutcome, SyncRequest};

/// The narrow contract the coordinator has with the sync tool.
#[async_trait]
pub trait SyncTool: Send + Sync {
    /// Run one sync. Tool failures are reported through the outcome; `Err`
    /// means no outcome could be produced (e.g. the log is unwritable).
    async fn run(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError>;

    /// Whether the tool's filter rules would ignore `path`.
    async fn excludes(&self, path: &Path, filter_file: &Path) -> bool;
}

/// [`SyncTool`] backed by the `rclone` binary.
#[derive(Clone)]
pub struct RcloneExecutor {
    program: PathBuf,
    interpreter: Arc<dyn LogInterpreter>,
}

impl RcloneExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            interpreter: Arc::new(BisyncLog),
        }
    }

    /// Swap the log interpreter, e.g. for a tool release with a different
    /// log format.
    pub fn with_interpreter(mut self, interpreter: Arc<dyn LogInterpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for `rclone bisync`, resync or resilient depending on the request.
    pub fn bisync_args(request: &SyncRequest) -> Vec<OsString> {
        vec![
            "bisync".into(),
            "-v".into(),
            request.local.clone().into_os_string(),
            request.remote.clone().into(),
            if request.resync {
                "--resync".into()
            } else {
                "--resilient".into()
            },
            "--filters-file".into(),
            request.filter_file.clone().into_os_string(),
            "--create-empty-src-dirs".into(),
            "--force".into(),
        ]
    }
}

impl std::fmt::Debug for RcloneExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcloneExecutor")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

/// `<log_dir>/<UTC timestamp>.log`; names sort chronologically.
pub fn run_log_path(log_dir: &Path, at: DateTime<Utc>) -> PathBuf {
    log_dir.join(format!("{}.log", at.format("%Y%m%dT%H%M%S%.3fZ")))
}

/// Append one chunk of raw output to both the log file and the in-memory
/// copy. Chunks missing a final newline get one so streams stay separated.
async fn record<W>(
    log: &mut W,
    log_path: &Path,
    raw: &mut Vec<u8>,
    chunk: &[u8],
) -> Result<(), SyncError>
where
    W: AsyncWrite + Unpin,
{
    log.write_all(chunk)
        .await
        .map_err(|e| io_err(log_path, e))?;
    raw.extend_from_slice(chunk);
    if !chunk.ends_with(b"\n") {
        log.write_all(b"\n")
            .await
            .map_err(|e| io_err(log_path, e))?;
        raw.push(b'\n');
    }
    Ok(())
}

/// Next newline-terminated chunk from `reader`, pending forever once the
/// reader has been dropped. Partial reads stay in `buf` across cancellation.
async fn next_chunk<R>(reader: &mut Option<R>, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(reader) => reader.read_until(b'\n', buf).await,
        None => std::future::pending().await,
    }
}

/// What to do with a stream after one read.
async fn on_chunk<R, W>(
    read: std::io::Result<usize>,
    reader: &mut Option<R>,
    buf: &mut Vec<u8>,
    stream: &'static str,
    log: &mut W,
    log_path: &Path,
    raw: &mut Vec<u8>,
) -> Result<(), SyncError>
where
    W: AsyncWrite + Unpin,
{
    if !buf.is_empty() {
        record(log, log_path, raw, buf).await?;
        buf.clear();
    }
    match read {
        Ok(0) => *reader = None,
        Ok(_) => {}
        Err(err) => {
            // Dropping the reader closes the pipe, so the tool sees EPIPE
            // instead of blocking on a full buffer.
            tracing::warn!(stream, error = %err, "reading sync tool output failed");
            *reader = None;
        }
    }
    Ok(())
}

/// Copy stdout and stderr into the log, byte for byte, until both close.
async fn pump<O, E, W>(
    stdout: O,
    stderr: E,
    log: &mut W,
    log_path: &Path,
    raw: &mut Vec<u8>,
) -> Result<(), SyncError>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut out = Some(BufReader::new(stdout));
    let mut err = Some(BufReader::new(stderr));
    let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());

    while out.is_some() || err.is_some() {
        tokio::select! {
            read = next_chunk(&mut out, &mut out_buf), if out.is_some() => {
                on_chunk(read, &mut out, &mut out_buf, "stdout", log, log_path, raw).await?;
            }
            read = next_chunk(&mut err, &mut err_buf), if err.is_some() => {
                on_chunk(read, &mut err, &mut err_buf, "stderr", log, log_path, raw).await?;
            }
        }
    }
    Ok(())
}

/// Stream the child's output into the log and wait for it to exit. On any
/// failure the child is killed and reaped before the error is returned.
async fn supervise<W>(
    mut child: Child,
    program: &Path,
    log: &mut W,
    log_path: &Path,
    raw: &mut Vec<u8>,
) -> Result<ExitStatus, SyncError>
where
    W: AsyncWrite + Unpin,
{
    let streamed = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => pump(stdout, stderr, log, log_path, raw).await,
        _ => Err(io_err(program, std::io::Error::other("output not captured"))),
    };
    let waited = match streamed {
        Ok(()) => child.wait().await.map_err(|e| io_err(program, e)),
        Err(err) => Err(err),
    };

    if waited.is_err() {
        if let Err(err) = child.kill().await {
            tracing::warn!(
                program = %program.display(),
                error = %err,
                "killing sync tool failed",
            );
        }
    }
    waited
}

#[async_trait]
impl SyncTool for RcloneExecutor {
    async fn run(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        tokio::fs::create_dir_all(&request.log_dir)
            .await
            .map_err(|e| io_err(&request.log_dir, e))?;

        let log_path = run_log_path(&request.log_dir, Utc::now());
        let mut log = File::create(&log_path)
            .await
            .map_err(|e| io_err(&log_path, e))?;
        let mut raw = Vec::new();

        let child = match Command::new(&self.program)
            .args(Self::bisync_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                let line = format!("failed to start {}: {err}", self.program.display());
                record(&mut log, &log_path, &mut raw, line.as_bytes()).await?;
                log.flush().await.map_err(|e| io_err(&log_path, e))?;
                return Ok(SyncOutcome::not_started(log_path));
            }
        };

        let status = supervise(child, &self.program, &mut log, &log_path, &mut raw).await?;
        log.flush().await.map_err(|e| io_err(&log_path, e))?;

        Ok(SyncOutcome::from_exit(
            status.code(),
            &String::from_utf8_lossy(&raw),
            log_path,
            self.interpreter.as_ref(),
        ))
    }

    async fn excludes(&self, path: &Path, filter_file: &Path) -> bool {
        let output = Command::new(&self.program)
            .arg("lsf")
            .arg(path)
            .arg("--filter-from")
            .arg(filter_file)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            // An included file is listed by name; an excluded one lists nothing.
            Ok(output) if output.status.success() => output.stdout.len() < 2,
            Ok(_) => false,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "filter probe failed; treating path as included",
                );
                false
            }
        }
    }
}
