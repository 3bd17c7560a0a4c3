//! # meshsync-sync
//!
//! The external sync tool seen through a narrow contract.
//!
//! [`SyncTool::run`] invokes `rclone bisync` for one folder and returns a
//! [`SyncOutcome`]; the changeset is derived from the captured log by a
//! [`LogInterpreter`], kept separate so the text contract with the tool can
//! be tested on its own.

pub mod error;
pub mod executor;
pub mod filters;
pub mod interpreter;
pub mod outcome;
pub mod retention;

pub use error::SyncError;
pub use executor::{RcloneExecutor, SyncTool};
pub use interpreter::{BisyncLog, LogInterpreter};
pub use outcome::{ExitCategory, SyncOutcome, SyncRequest};
