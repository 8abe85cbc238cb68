//! Keyword rule inspection commands

use std::path::Path;

use anyhow::Result;

use super::{load_config, truncate};

pub fn cmd_rules_list(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    if config.keyword_rules.is_empty() {
        println!("No keyword rules configured");
        return Ok(());
    }

    println!();
    println!("📋 Keyword rules (first match wins):");
    println!("   ─────────────────────────────────────────────────────────────");
    for (i, rule) in config.keyword_rules.iter().enumerate() {
        println!(
            "   {:>3}. {:<40} {:<8} -> {}",
            i + 1,
            truncate(&rule.pattern, 40),
            rule.match_mode.as_str(),
            rule.category
        );
    }

    Ok(())
}

pub fn cmd_rules_test(config_path: Option<&Path>, description: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let cleaned = config.normalizer()?.normalize(description);
    let keywords = config.keyword_classifier()?;

    if cleaned != description {
        println!("Cleaned: \"{}\"", cleaned);
    }

    let matches = keywords.test(&cleaned);
    if matches.is_empty() {
        println!("No rules match \"{}\"", cleaned);
        return Ok(());
    }

    println!();
    println!("🔍 Rules matching \"{}\":", cleaned);
    println!("   ─────────────────────────────────────────────────────────────");
    for (i, rule) in matches.iter().enumerate() {
        let marker = if i == 0 { "→" } else { " " };
        println!(
            "   {} {} ({}: {})",
            marker,
            rule.category,
            rule.match_mode.as_str(),
            rule.pattern
        );
    }

    Ok(())
}
