//! `meshsync run`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::load_config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file; defaults to `<config dir>/meshsync/config.yaml`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit log lines as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        meshsync_daemon::start_blocking(config, self.json).context("daemon exited with error")
    }
}
