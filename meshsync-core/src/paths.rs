//! On-disk layout shared by every host.
//!
//! ```text
//! ~/.sync/
//!   <hostname>.<checksum>.filters.txt   (generated filter rules, one per folder)
//!   <checksum>/
//!     <timestamp>.log                   (one per sync run)
//! <local folder>/
//!   .gitkeep                            (baseline marker)
//! ```

use std::path::{Path, PathBuf};

use crate::types::ChecksumId;

pub const METADATA_DIR: &str = ".sync";

/// Sentinel file proving a successful first sync established a baseline.
pub const BASELINE_MARKER: &str = ".gitkeep";

/// `<home>/.sync`
pub fn metadata_root(home: &Path) -> PathBuf {
    home.join(METADATA_DIR)
}

/// `<home>/.sync/<checksum>` holding the folder's run logs.
pub fn folder_log_dir(home: &Path, checksum: &ChecksumId) -> PathBuf {
    metadata_root(home).join(checksum.as_str())
}

/// `<home>/.sync/<hostname>.<checksum>.filters.txt`
pub fn filter_file_path(home: &Path, hostname: &str, checksum: &ChecksumId) -> PathBuf {
    metadata_root(home).join(format!("{hostname}.{checksum}.filters.txt"))
}

/// `<local>/.gitkeep`
pub fn baseline_marker_path(local: &Path) -> PathBuf {
    local.join(BASELINE_MARKER)
}
