//! Generated filter-rules file handed to the sync tool.
//!
//! The file is rewritten at every folder start: global rules first, then the
//! folder's own, newline-joined. Writes go to `<path>.tmp` and are renamed
//! into place so the tool never reads a half-written rule set.

use std::path::Path;

use crate::error::{io_err, SyncError};

/// Atomically write `rules` to `path`, creating the parent directory.
pub fn write_filter_file(path: &Path, rules: &[String]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let content = rules.join("\n");
    let tmp = path.with_extension("txt.tmp");
    std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }

    tracing::debug!(path = %path.display(), rules = rules.len(), "filter file written");
    Ok(())
}
