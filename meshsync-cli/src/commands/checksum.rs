//! `meshsync checksum`

use anyhow::Result;
use clap::Args;

use meshsync_core::ChecksumId;

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// Remote path as written in the config, e.g. `gdrive:Documents`.
    pub remote: String,
}

impl ChecksumArgs {
    pub fn run(self) -> Result<()> {
        println!("{}", ChecksumId::from_remote(&self.remote));
        Ok(())
    }
}
