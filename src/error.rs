//! Error types for NovaSweep

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for NovaSweep operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Total backup size {total} bytes exceeds limit of {limit} bytes")]
    SizeLimitExceeded { total: u64, limit: u64 },

    #[error("Backup source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Backup not found: {name}")]
    BackupNotFound { name: String },

    #[error("Backup already exists: {name}")]
    BackupExists { name: String },

    #[error("Storage for backup '{name}' is missing: {}", path.display())]
    MissingStorage { name: String, path: PathBuf },

    #[error("No recovery entry for {}", path.display())]
    RecoveryEntryNotFound { path: PathBuf },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Scheduling error: {reason}")]
    Scheduling { reason: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for NovaSweep operations
pub type Result<T> = std::result::Result<T, Error>;
