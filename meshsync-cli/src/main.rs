//! meshsync: keep folders converged across hosts with `rclone bisync` and a
//! shared message bus.
//!
//! # Usage
//!
//! ```text
//! meshsync run [--config <path>] [--json]
//! meshsync check [--config <path>] [--host <name>] [--json]
//! meshsync checksum <remote>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, checksum::ChecksumArgs, run::RunArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "meshsync",
    version,
    about = "Bidirectional folder sync coordinated over a message bus",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync daemon in the foreground until Ctrl-C.
    Run(RunArgs),

    /// Validate the config and show this host's folders and bus topology.
    Check(CheckArgs),

    /// Print the checksum id derived from a remote path.
    Checksum(ChecksumArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Checksum(args) => args.run(),
    }
}
