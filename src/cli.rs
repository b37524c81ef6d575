// src/cli.rs

//! Command-line surface for the `revkeepd` binary.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "revkeepd")]
#[command(author, version, about = "Transactional, versioned file sync for paired content trees", long_about = None)]
pub struct Cli {
    /// Path to a revkeep.toml config file. Missing is not an error —
    /// defaults apply, then environment overrides.
    #[arg(short, long, default_value = "/etc/revkeep/revkeep.toml")]
    pub config: std::path::PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sync server.
    Serve,
    /// Apply any pending metadata-index migrations and exit.
    Migrate,
    /// Create an admin user, prompting for a password on stdin.
    CreateAdmin {
        /// Username for the new admin account.
        username: String,
    },
}
