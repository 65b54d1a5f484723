//! Scan command implementation.

use super::Context;
use crate::classify::Category;
use crate::scanner::{ScanEngine, ScanResult};
use crate::Result;
use clap::Args;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// Arguments for the scan command
#[derive(Args)]
pub struct ScanArgs {
    /// Directory to scan
    #[arg(short, long)]
    pub path: PathBuf,

    /// Number of hashing workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Files above this many bytes are reported as large
    #[arg(long)]
    pub large_threshold: Option<u64>,

    /// Files not modified for more than this many days are reported as old
    #[arg(long)]
    pub old_days: Option<u32>,

    /// Follow symbolic links
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Write the full result as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Run the scan command
pub fn run(args: ScanArgs, ctx: &Context) -> Result<ExitCode> {
    let mut config = ctx.config.scan.clone();
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(threshold) = args.large_threshold {
        config.large_file_threshold = threshold;
    }
    if let Some(days) = args.old_days {
        config.old_file_days = days;
    }
    config.follow_symlinks |= args.follow_symlinks;

    println!("Scanning directory: {}", args.path.display());
    let engine = ScanEngine::new(config)?;
    let result = engine.scan(&args.path)?;
    print_summary(&result);

    if let Some(output_path) = args.output {
        let mut writer = BufWriter::new(File::create(&output_path)?);
        serde_json::to_writer_pretty(&mut writer, &result)?;
        writer.flush()?;
        println!("Result written to: {}", output_path.display());
    }

    Ok(ExitCode::SUCCESS)
}

fn print_summary(result: &ScanResult) {
    println!("Scan completed: {} files processed", result.files_scanned);

    if result.duplicates.is_empty() {
        println!("No duplicate files found.");
    } else {
        println!(
            "Found {} duplicate groups ({} redundant files):",
            result.duplicates.len(),
            result.redundant_files()
        );
        for (fingerprint, paths) in &result.duplicates {
            println!("  {}", fingerprint);
            for path in paths {
                println!("    - {}", path.display());
            }
        }
    }

    if !result.large_files.is_empty() {
        println!("Large files:");
        for file in &result.large_files {
            println!("  {} ({} bytes)", file.path.display(), file.size);
        }
    }

    if !result.old_files.is_empty() {
        println!("Old files:");
        for file in &result.old_files {
            println!(
                "  {} (modified {})",
                file.path.display(),
                file.last_modified.format("%Y-%m-%d")
            );
        }
    }

    println!("By category:");
    for category in Category::ALL {
        println!("  {:<10} {}", category.as_str(), result.category(category).len());
    }

    if result.is_partial() {
        println!(
            "Partial result: {} files skipped, {} traversal warnings",
            result.skipped.len(),
            result.warnings.len()
        );
        for skipped in &result.skipped {
            println!("  {}: {}", skipped.path.display(), skipped.reason);
        }
    }
}
