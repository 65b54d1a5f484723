//! Command-line interface for NovaSweep.
//!
//! Each subcommand lives in its own module with an `Args` struct and a
//! synchronous `run` function. Shared state (configuration and the backup
//! store location) is resolved once into a [`Context`].

use crate::backup::BackupManager;
use crate::config::AppConfig;
use crate::logging::LogFormat;
use crate::recovery::RecoveryLog;
use crate::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod backup;
pub mod recover;
pub mod scan;
pub mod schedule;

/// NovaSweep - find duplicate, oversized and stale files and keep managed backups
#[derive(Parser)]
#[command(name = "nova-sweep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Backup store directory
    #[arg(long, short = 'r', global = true, env = "NOVA_SWEEP_ROOT")]
    pub root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory for duplicate, large and old files
    Scan(scan::ScanArgs),
    /// Create, restore, verify and expire backups
    Backup(backup::BackupArgs),
    /// Run backups periodically until stopped
    Schedule(schedule::ScheduleArgs),
    /// Restore files saved before deletion
    Recover(recover::RecoverArgs),
}

/// Output format for listings and reports
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Resolved configuration shared by all commands
#[derive(Debug, Clone)]
pub struct Context {
    pub config: AppConfig,
    pub backup_root: PathBuf,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = AppConfig::load_or_default(cli.config.as_deref())?;
        let backup_root = match &cli.root {
            Some(root) => root.clone(),
            None => AppConfig::default_backup_root()?,
        };
        Ok(Self {
            config,
            backup_root,
        })
    }

    pub fn backup_manager(&self) -> Result<BackupManager> {
        BackupManager::open(&self.backup_root, self.config.backup.clone())
    }

    /// Safety copies live next to the backups
    pub fn recovery_log(&self) -> Result<RecoveryLog> {
        RecoveryLog::open(self.backup_root.join("recovery"))
    }
}
