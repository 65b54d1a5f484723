//! Backup command implementation.

use super::{Context, OutputFormat};
use crate::backup::{BackupRecord, VerificationReport, TIMESTAMP_FORMAT};
use crate::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Arguments for the backup command
#[derive(Args)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub action: BackupAction,
}

#[derive(Subcommand)]
pub enum BackupAction {
    /// Back up files and directories into the store
    Create {
        /// File or directory to include (repeatable)
        #[arg(long, short, required = true)]
        source: Vec<PathBuf>,

        /// Backup name (default: backup_<timestamp>)
        #[arg(long, short)]
        name: Option<String>,

        /// Keep an uncompressed copy instead of a zip archive
        #[arg(long)]
        no_compress: bool,
    },
    /// List recorded backups
    List {
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Restore a backup into a directory
    Restore {
        /// Backup name
        name: String,

        /// Target directory for restore
        #[arg(long, short)]
        target: PathBuf,
    },
    /// Check a backup's integrity
    Verify {
        /// Backup name
        name: String,

        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Delete a backup and its storage
    Delete {
        /// Backup name
        name: String,
    },
    /// Delete backups older than the retention window
    Cleanup,
}

/// Run the backup command
pub fn run(args: BackupArgs, ctx: &Context) -> Result<ExitCode> {
    match args.action {
        BackupAction::Create {
            source,
            name,
            no_compress,
        } => {
            let mut ctx = ctx.clone();
            ctx.config.backup.compression &= !no_compress;
            let manager = ctx.backup_manager()?;

            let record = manager.create_backup(&source, name.as_deref())?;
            println!("Backup completed successfully!");
            print_record(&record);
        }
        BackupAction::List { format } => {
            let backups = ctx.backup_manager()?.list_backups();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&backups)?),
                OutputFormat::Table => print_table(&backups),
            }
        }
        BackupAction::Restore { name, target } => {
            let summary = ctx.backup_manager()?.restore_backup(&name, &target)?;
            println!("Restored '{}' to {}", name, target.display());
            println!("  Files restored: {}", summary.files_restored);
            println!("  Bytes restored: {}", summary.bytes_restored);
        }
        BackupAction::Verify { name, format } => {
            let report = ctx.backup_manager()?.verify_backup(&name)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Table => print_report(&report),
            }
            if !report.is_verified() {
                return Ok(ExitCode::FAILURE);
            }
        }
        BackupAction::Delete { name } => {
            let record = ctx.backup_manager()?.delete_backup(&name)?;
            println!("Deleted backup '{}' ({})", record.name, record.storage_path.display());
        }
        BackupAction::Cleanup => {
            let manager = ctx.backup_manager()?;
            let removed = manager.cleanup_old_backups()?;
            println!(
                "Removed {} backups older than {} days",
                removed,
                manager.retention().retention_days()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_record(record: &BackupRecord) {
    println!("  Name: {}", record.name);
    println!("  Created: {}", record.timestamp.format(TIMESTAMP_FORMAT));
    println!("  Files: {}", record.file_count);
    println!("  Total size: {} bytes", record.size_bytes);
    println!("  Compressed: {}", record.compressed);
    println!("  Stored at: {}", record.storage_path.display());
}

fn print_table(backups: &[BackupRecord]) {
    if backups.is_empty() {
        println!("No backups recorded.");
        return;
    }

    println!("{:<32} {:<16} {:>8} {:>14} {:<5}", "Name", "Created", "Files", "Bytes", "Zip");
    println!("{:-<79}", "");
    for record in backups {
        println!(
            "{:<32} {:<16} {:>8} {:>14} {:<5}",
            record.name,
            record.timestamp.format(TIMESTAMP_FORMAT),
            record.file_count,
            record.size_bytes,
            if record.compressed { "yes" } else { "no" }
        );
    }
}

fn print_report(report: &VerificationReport) {
    println!("Backup '{}': {:?}", report.name, report.status);
    println!("  Files checked: {}", report.files_checked);
    println!("  Total size: {} bytes", report.total_size);
    if !report.errors.is_empty() {
        println!("\nErrors:");
        for error in &report.errors {
            println!("  {}", error);
        }
    }
}
