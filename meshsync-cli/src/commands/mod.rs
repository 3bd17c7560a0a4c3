pub mod check;
pub mod checksum;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use meshsync_core::config::{self, Config};

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::default_config_path().context("could not locate the config directory")?,
    };
    config::load_at(&path).with_context(|| format!("failed to load config from {}", path.display()))
}
