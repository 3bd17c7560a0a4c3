//! Count-based retention for per-folder run logs.
//!
//! Run logs are named by UTC timestamp, so lexical order is chronological
//! and the oldest files are the first ones after sorting.

use std::fs;
use std::io;
use std::path::Path;

/// Delete the oldest `*.log` files in `dir` so that at most `keep` remain.
///
/// Returns the number of files removed. A missing directory is not an error.
pub fn prune_run_logs(dir: &Path, keep: usize) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };

    let mut logs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("log") {
            logs.push(path);
        }
    }

    if logs.len() <= keep {
        return Ok(0);
    }

    logs.sort();
    let excess = logs.len() - keep;
    for path in &logs[..excess] {
        fs::remove_file(path)?;
    }
    Ok(excess)
}

/// [`prune_run_logs`] that only logs failures.
pub fn prune_quietly(dir: &Path, keep: usize) {
    match prune_run_logs(dir, keep) {
        Ok(0) => {}
        Ok(removed) => tracing::debug!(dir = %dir.display(), removed, "pruned run logs"),
        Err(err) => tracing::warn!(dir = %dir.display(), error = %err, "run log pruning failed"),
    }
}
