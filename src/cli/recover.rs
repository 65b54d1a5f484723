//! Recover command: manage safety copies of deleted files.

use super::{Context, OutputFormat};
use crate::backup::TIMESTAMP_FORMAT;
use crate::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Arguments for the recover command
#[derive(Args)]
pub struct RecoverArgs {
    #[command(subcommand)]
    pub action: RecoverAction,
}

#[derive(Subcommand)]
pub enum RecoverAction {
    /// Copy a file aside so it can be recovered after deletion
    Save {
        /// File to save
        path: PathBuf,
    },
    /// List recoverable files
    List {
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Restore a file to its original location
    File {
        /// Original path of the file
        path: PathBuf,
    },
    /// Drop saved copies older than the given age
    Cleanup {
        /// Age in days
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

/// Run the recover command
pub fn run(args: RecoverArgs, ctx: &Context) -> Result<ExitCode> {
    let log = ctx.recovery_log()?;

    match args.action {
        RecoverAction::Save { path } => match log.backup_before_delete(&path)? {
            Some(saved) => println!("Saved {} to {}", path.display(), saved.display()),
            None => {
                println!("No such file: {}", path.display());
                return Ok(ExitCode::FAILURE);
            }
        },
        RecoverAction::List { format } => {
            let entries = log.list_recoverable();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
                OutputFormat::Table if entries.is_empty() => println!("Nothing to recover."),
                OutputFormat::Table => {
                    println!("{:<16} {}", "Saved", "Original path");
                    println!("{:-<60}", "");
                    for entry in entries {
                        println!(
                            "{:<16} {}",
                            entry.timestamp.format(TIMESTAMP_FORMAT),
                            entry.original_path.display()
                        );
                    }
                }
            }
        }
        RecoverAction::File { path } => {
            let restored = log.recover_file(&path)?;
            println!("Recovered {}", restored.display());
        }
        RecoverAction::Cleanup { days } => {
            let removed = log.cleanup_old(days)?;
            println!("Removed {} saved copies older than {} days", removed, days);
        }
    }

    Ok(ExitCode::SUCCESS)
}
