//! Configuration and file inspection commands
//!
//! This module contains:
//! - `load_config` - Shared utility to locate, load and validate the config
//! - `cmd_check` - Validate the configuration and check the classifier is reachable
//! - `cmd_detect` - Show bank format and account of one file

use std::path::Path;

use anyhow::{Context, Result};
use cashew_core::{import_file, AIBackend, AIClient, Config, Dialect};

/// Load the config from `path`, or from the default location
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::default_path);
    Config::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
}

pub async fn cmd_check(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    println!();
    println!("✅ Configuration is valid");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Accounts:");
    for account in &config.accounts {
        println!(
            "     {} ({}, weight {})",
            account.name, account.number, account.weight
        );
    }
    println!("   Categories:    {}", config.category_set().names().join(", "));
    println!("   Keyword rules: {}", config.keyword_rules.len());
    println!(
        "   Cleanup rules: {}",
        if config.normalizer.rules.is_empty() {
            "built-in".to_string()
        } else {
            config.normalizer.rules.len().to_string()
        }
    );

    match AIClient::from_config(&config.classifier)? {
        Some(client) => {
            println!(
                "   Classifier:    {} at {} (batches of {}, {} in flight)",
                client.model(),
                client.host(),
                config.classifier.batch_size,
                config.classifier.max_concurrency
            );
            if client.health_check().await {
                println!("                  ✅ Reachable");
            } else {
                println!("                  ❌ Not reachable, transactions will stay Uncategorized");
            }
        }
        None => println!("   Classifier:    disabled (keyword rules only)"),
    }

    println!(
        "   Links:         {} ({} transactions per link)",
        config.link.base_url, config.link.max_per_link
    );
    match &config.email {
        Some(email) => println!(
            "   Email:         {} via {}:{}",
            email.recipient, email.smtp.server, email.smtp.port
        ),
        None => println!("   Email:         not configured"),
    }

    Ok(())
}

pub fn cmd_detect(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let content = String::from_utf8_lossy(&bytes);
    let Some(dialect) = Dialect::detect(&name, &content) else {
        anyhow::bail!(
            "Could not detect bank format of {}.\n\
             Supported formats: dkb, migrosbank, capitalone",
            file.display()
        );
    };
    println!("🔍 {}: {} format", file.display(), dialect);

    let imported = import_file(&name, &bytes, &config.shared_accounts())?;
    for account in imported.accounts() {
        println!("   Account: {} ({})", account.name, account.number);
    }
    println!("   Transactions: {}", imported.transactions.len());
    if !imported.warnings.is_empty() {
        println!("   ⚠️  Skipped rows: {}", imported.warnings.len());
        for warning in &imported.warnings {
            println!("      line {}: {}", warning.line, warning.reason);
        }
    }

    Ok(())
}
