//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cashew-import - Turn bank exports into Cashew app links
#[derive(Parser)]
#[command(name = "cashew-import")]
#[command(about = "Import bank CSV exports into the Cashew finance app", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: config/cashew.toml, else the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import every CSV in the input directory and deliver the links
    Run {
        /// Directory containing the bank exports
        #[arg(short, long, default_value = "input")]
        input: PathBuf,

        /// Write the links to this file instead of printing them
        #[arg(short, long, conflicts_with = "email")]
        output: Option<PathBuf>,

        /// Send the links by email (requires an [email] config section)
        #[arg(short, long)]
        email: bool,

        /// Move processed files to <input>/archive afterwards
        #[arg(long)]
        archive: bool,

        /// Categorize and report, but skip delivery and archiving
        #[arg(long)]
        dry_run: bool,
    },

    /// Load and validate the configuration
    Check,

    /// Inspect keyword rules
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Show the detected bank format and account of a file
    Detect {
        /// CSV file to inspect
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List configured keyword rules in evaluation order
    List,

    /// Show which rules match a description
    Test {
        /// Transaction description (cleanup rules are applied first)
        description: String,
    },
}
