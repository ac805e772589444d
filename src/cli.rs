//! Command-line interface for strictly_guess.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Strictly Guess - staged guessing game with rewards and a leaderboard
#[derive(Parser, Debug)]
#[command(name = "strictly_guess")]
#[command(about = "Staged guessing game with rewards and a leaderboard", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a session in the terminal
    Play {
        /// Player name
        #[arg(short, long)]
        name: String,

        /// Engine configuration file (defaults used if absent)
        #[arg(short, long, default_value = "strictly_guess.toml")]
        config: PathBuf,

        /// Item catalog
        #[arg(long, default_value = "data/catalog.toml")]
        catalog: PathBuf,

        /// Path to the database file (created if it doesn't exist)
        #[arg(long, default_value = "strictly_guess.db")]
        db_path: String,

        /// Remote leaderboard service. If not provided, the local database is polled.
        #[arg(long)]
        leaderboard_url: Option<String>,
    },

    /// Print the leaderboard from the local database
    Leaderboard {
        /// Path to the database file
        #[arg(long, default_value = "strictly_guess.db")]
        db_path: String,

        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply pending database migrations
    Migrate {
        /// Path to the database file
        #[arg(long, default_value = "strictly_guess.db")]
        db_path: String,
    },
}
