//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Playtime ledger.
///
/// Keeps cumulative per-player play time across restarts and exports it to
/// InfluxDB.
#[derive(Debug, Parser)]
#[command(name = "pt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the leaderboard.
    Top {
        /// Number of players to show.
        #[arg(default_value_t = 10)]
        limit: usize,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show one player's play time.
    Show {
        /// Player name or UUID.
        player: String,
    },

    /// Push every player's total to InfluxDB now.
    Export,

    /// Zero all totals and close open sessions.
    Reset,

    /// Record a login.
    Login {
        /// Player UUID.
        player: String,

        /// Current display name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Record a logout.
    Logout {
        /// Player UUID.
        player: String,

        /// Current display name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Run the one-time historical import.
    Backfill {
        /// Run even if a previous import left its marker.
        #[arg(long)]
        force: bool,
    },

    /// Show ledger file and session status.
    Status,

    /// Read host events as JSON lines from stdin until shutdown.
    Serve,
}
