//! Inputs and normalized outputs of one sync run.

use std::fmt;
use std::path::PathBuf;

use meshsync_core::ChangeSet;

use crate::interpreter::LogInterpreter;

/// Everything the tool needs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub local: PathBuf,
    pub remote: String,
    pub filter_file: PathBuf,
    /// Force a full baseline resync instead of the resilient incremental mode.
    pub resync: bool,
    pub log_dir: PathBuf,
}

/// Three-way classification of the tool's exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCategory {
    /// Exit code 0.
    Clean,
    /// Exit code 1: transient, retry without discarding convergence state.
    MinorError,
    /// Anything else: state diverged, a full resync is required.
    FatalError,
}

impl ExitCategory {
    /// `None` means the process was terminated by a signal.
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitCategory::Clean,
            Some(1) => ExitCategory::MinorError,
            _ => ExitCategory::FatalError,
        }
    }
}

impl fmt::Display for ExitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCategory::Clean => write!(f, "clean"),
            ExitCategory::MinorError => write!(f, "minor error"),
            ExitCategory::FatalError => write!(f, "fatal error"),
        }
    }
}

/// Result of one run. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub succeeded: bool,
    pub category: ExitCategory,
    pub exit_code: Option<i32>,
    /// This side reported at least one change in the run summary.
    pub changed: bool,
    pub changeset: ChangeSet,
    pub log_path: PathBuf,
}

impl SyncOutcome {
    /// Build the outcome of a finished process from its exit code and log.
    pub fn from_exit(
        code: Option<i32>,
        raw_log: &str,
        log_path: PathBuf,
        interpreter: &dyn LogInterpreter,
    ) -> Self {
        let category = ExitCategory::from_code(code);
        Self {
            succeeded: category == ExitCategory::Clean,
            category,
            exit_code: code,
            changed: interpreter.own_side_changes(raw_log) > 0,
            changeset: interpreter.interpret(raw_log),
            log_path,
        }
    }

    /// The tool could not be started. Nothing touched the folder, so this is
    /// retried as a minor error.
    pub fn not_started(log_path: PathBuf) -> Self {
        Self {
            succeeded: false,
            category: ExitCategory::MinorError,
            exit_code: None,
            changed: false,
            changeset: ChangeSet::new(),
            log_path,
        }
    }
}
