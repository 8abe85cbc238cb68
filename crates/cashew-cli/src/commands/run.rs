//! The `run` command: input directory → categorized Cashew links

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cashew_core::{Config, InputFile, Pipeline, RunReport};
use chrono::{Local, NaiveDateTime};
use tracing::{info, warn};

use super::load_config;
use crate::delivery::Delivery;

pub struct RunOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub email: bool,
    pub archive: bool,
    pub dry_run: bool,
}

/// Returns false if any input file failed ingestion
pub async fn cmd_run(config_path: Option<&Path>, options: &RunOptions) -> Result<bool> {
    let config = load_config(config_path)?;
    let delivery = delivery_for(&config, options)?;

    let files = collect_inputs(&options.input)?;
    if files.is_empty() {
        warn!("No CSV files found in {}", options.input.display());
        return Ok(true);
    }
    let inputs = read_inputs(&files);

    println!(
        "📥 Processing {} files from {}...",
        inputs.len(),
        options.input.display()
    );

    let pipeline = Pipeline::from_config(&config)?;
    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let report = pipeline
        .run_until(&inputs, cancel)
        .await
        .context("Run aborted, no links delivered")?;

    print_report(&report);

    if options.dry_run {
        println!();
        println!("💡 Dry run: {} links not delivered", report.links.len());
        return Ok(!report.has_failures());
    }

    if report.links.is_empty() {
        println!();
        println!("Nothing to deliver");
    } else {
        delivery.deliver(&report.links).await?;
        println!();
        println!(
            "✅ Delivered {} links to {}",
            report.links.len(),
            delivery.describe()
        );
    }

    if options.archive {
        let archive_dir = options.input.join("archive");
        let now = Local::now().naive_local();
        for outcome in report.succeeded_files() {
            let source = options.input.join(&outcome.file_name);
            let target = archive_file(&source, &archive_dir, now)?;
            info!("Archived {} to {}", outcome.file_name, target.display());
        }
    }

    Ok(!report.has_failures())
}

pub fn delivery_for(config: &Config, options: &RunOptions) -> Result<Delivery> {
    if options.email {
        let email = config
            .email
            .clone()
            .context("--email needs an [email] section in the config")?;
        return Ok(Delivery::Email(email));
    }
    Ok(match &options.output {
        Some(path) => Delivery::File(path.clone()),
        None => Delivery::Print,
    })
}

/// `*.csv` files directly inside `dir`, sorted by file name
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Read every file; a file that cannot be read fails on its own
pub fn read_inputs(files: &[PathBuf]) -> Vec<InputFile> {
    files
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match std::fs::read(path) {
                Ok(bytes) => InputFile::new(name, bytes),
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    InputFile::unreadable(name, format!("Failed to read file: {}", e))
                }
            }
        })
        .collect()
}

/// Move `file` into `archive_dir` as `<stem>_YYYYmmdd_HHMMSS.<ext>`
pub fn archive_file(file: &Path, archive_dir: &Path, now: NaiveDateTime) -> Result<PathBuf> {
    std::fs::create_dir_all(archive_dir)
        .with_context(|| format!("Failed to create {}", archive_dir.display()))?;

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{}_{}", stem, now.format("%Y%m%d_%H%M%S"));
    if let Some(ext) = file.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }

    let target = archive_dir.join(name);
    std::fs::rename(file, &target).with_context(|| {
        format!(
            "Failed to move {} to {}",
            file.display(),
            target.display()
        )
    })?;
    Ok(target)
}

pub fn print_report(report: &RunReport) {
    println!();
    println!("📊 Run summary");
    println!("   ─────────────────────────────────────────────────────────────");
    for file in &report.files {
        match (&file.error, file.dialect) {
            (Some(error), _) => println!("   ❌ {}: {}", file.file_name, error),
            (None, Some(dialect)) => println!(
                "   ✅ {} ({}): {} transactions",
                file.file_name, dialect, file.transactions
            ),
            (None, None) => println!("   ✅ {}: {} transactions", file.file_name, file.transactions),
        }
        for warning in &file.warnings {
            println!("      ⚠️  line {}: {}", warning.line, warning.reason);
        }
    }

    let summary = &report.summary;
    println!();
    println!("   Categorized:   {}", summary.total());
    println!("   - By keyword:    {}", summary.by_keyword);
    println!("   - By classifier: {}", summary.by_remote);
    println!("   - Uncategorized: {}", summary.uncategorized);
    println!("   Links:         {}", report.links.len());
}
