//! # NovaSweep
//!
//! Directory sweeper that finds duplicate, oversized and stale files, and a
//! managed backup store with scheduled snapshots, integrity checks and
//! age-based retention.
//!
//! ## Features
//!
//! - **Scanner**: one walker thread and a pool of hashing workers connected by
//!   a bounded queue, with cooperative cancellation
//! - **Backups**: zip or plain-tree snapshots with a persisted history
//! - **Scheduling**: periodic backups on a background thread
//! - **Recovery**: safety copies of files taken before deletion
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nova_sweep::config::{BackupConfig, ScanConfig};
//! use nova_sweep::{BackupManager, ScanEngine};
//!
//! # fn main() -> nova_sweep::Result<()> {
//! let result = ScanEngine::new(ScanConfig::default())?.scan("./my-data")?;
//! println!("{} duplicate groups", result.duplicates.len());
//!
//! let manager = BackupManager::open("./backups", BackupConfig::default())?;
//! let record = manager.create_backup(&["./my-data"], None)?;
//! println!("Backup stored at {}", record.storage_path.display());
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod cancel;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod recovery;
pub mod retention;
pub mod scanner;
pub mod scheduling;

// Re-export commonly used types
pub use backup::{BackupManager, BackupRecord, VerificationReport, VerificationStatus};
pub use cancel::CancellationToken;
pub use classify::{classify, Category};
pub use config::{AppConfig, BackupConfig, ScanConfig};
pub use error::{Error, Result};
pub use fingerprint::{FileHasher, Fingerprint, HashAlgorithm};
pub use recovery::{RecoveryEntry, RecoveryLog};
pub use retention::RetentionPolicy;
pub use scanner::{ScanEngine, ScanResult};
pub use scheduling::Scheduler;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
