//! cashew-import CLI - Bank exports to Cashew app links
//!
//! Usage:
//!   cashew-import run --input DIR        Categorize exports and deliver links
//!   cashew-import check                  Validate the configuration
//!   cashew-import rules test "REWE 123"  Show matching keyword rules
//!   cashew-import detect FILE            Show bank format and account

mod cli;
mod commands;
mod delivery;


use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            input,
            output,
            email,
            archive,
            dry_run,
        } => {
            let options = commands::RunOptions {
                input,
                output,
                email,
                archive,
                dry_run,
            };
            let clean = commands::cmd_run(config_path, &options).await?;
            return Ok(if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        Commands::Check => commands::cmd_check(config_path).await?,
        Commands::Rules { action } => match action {
            None | Some(RulesAction::List) => commands::cmd_rules_list(config_path)?,
            Some(RulesAction::Test { description }) => {
                commands::cmd_rules_test(config_path, &description)?
            }
        },
        Commands::Detect { file } => commands::cmd_detect(config_path, &file)?,
    }

    Ok(ExitCode::SUCCESS)
}
