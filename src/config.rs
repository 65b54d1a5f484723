//! Immutable configuration handed to each component at construction

use crate::fingerprint::HashAlgorithm;
use crate::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub backup: BackupConfig,
}

/// Configuration for the scanning engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of hashing workers
    pub workers: usize,
    /// Files strictly larger than this many bytes are reported as large
    pub large_file_threshold: u64,
    /// Files not modified for strictly more than this many days are reported as old
    pub old_file_days: u32,
    /// Glob patterns matched against entry names
    pub ignore_patterns: Vec<String>,
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Files smaller than this are not scanned
    pub min_file_size: u64,
    /// Files larger than this are not scanned
    pub max_file_size: u64,
    /// Digest used for content fingerprints
    pub hash_algorithm: HashAlgorithm,
    /// Read block size used while hashing
    pub block_size: usize,
    /// How long an idle worker waits on the queue before re-checking cancellation
    pub poll_timeout_ms: u64,
    /// Capacity of the pending-path queue
    pub queue_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            large_file_threshold: 100 * MIB,
            old_file_days: 180,
            ignore_patterns: vec![
                ".*".to_string(),
                "~$*".to_string(),
                "Thumbs.db".to_string(),
                ".DS_Store".to_string(),
                "*.tmp".to_string(),
                "*.temp".to_string(),
            ],
            follow_symlinks: false,
            min_file_size: KIB,
            max_file_size: 10 * GIB,
            hash_algorithm: HashAlgorithm::default(),
            block_size: 64 * KIB as usize,
            poll_timeout_ms: 100,
            queue_capacity: 1024,
        }
    }
}

impl ScanConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Configuration {
                reason: "scan.workers must be at least 1".to_string(),
            });
        }
        if self.block_size == 0 {
            return Err(Error::Configuration {
                reason: "scan.block_size must be non-zero".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(Error::Configuration {
                reason: "scan.queue_capacity must be non-zero".to_string(),
            });
        }
        if self.min_file_size > self.max_file_size {
            return Err(Error::Configuration {
                reason: format!(
                    "scan.min_file_size ({}) exceeds scan.max_file_size ({})",
                    self.min_file_size, self.max_file_size
                ),
            });
        }
        for pattern in &self.ignore_patterns {
            glob::Pattern::new(pattern).map_err(|e| Error::Configuration {
                reason: format!("invalid ignore pattern '{}': {}", pattern, e),
            })?;
        }
        Ok(())
    }
}

/// Configuration for the backup manager, scheduler and retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Upper bound on the summed size of all files in one backup
    pub max_backup_size: u64,
    /// Archive the staging tree into a single zip file
    pub compression: bool,
    /// Interval between scheduled backups, in seconds
    pub backup_interval_secs: u64,
    /// Records older than this many days are removed by cleanup
    pub retention_days: u32,
    /// Number of threads used to copy files
    pub copy_concurrency: usize,
    /// How long `Scheduler::stop` waits for the background thread
    pub stop_timeout_ms: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_backup_size: 10 * GIB,
            compression: true,
            backup_interval_secs: 24 * 60 * 60,
            retention_days: 30,
            copy_concurrency: 4,
            stop_timeout_ms: 2000,
        }
    }
}

impl BackupConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.copy_concurrency == 0 {
            return Err(Error::Configuration {
                reason: "backup.copy_concurrency must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        self.backup.validate()
    }

    /// Default location of the backup store
    pub fn default_backup_root() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "nova-sweep").ok_or_else(|| {
            Error::Configuration {
                reason: "Could not determine data directory".to_string(),
            }
        })?;

        Ok(project_dirs.data_dir().join("backups"))
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() -> Result<()> {
        let config = AppConfig::default();
        config.validate()?;
        assert!(config.scan.workers >= 1);
        assert_eq!(config.scan.large_file_threshold, 100 * 1024 * 1024);
        assert_eq!(config.backup.retention_days, 30);
        Ok(())
    }

    #[test]
    fn test_load_partial_toml() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[scan]\nworkers = 2\nhash_algorithm = \"sha256\"\n\n[backup]\ncompression = false\n",
        )?;

        let config = AppConfig::load(&path)?;
        assert_eq!(config.scan.workers, 2);
        assert_eq!(config.scan.hash_algorithm, HashAlgorithm::Sha256);
        assert!(!config.backup.compression);
        // untouched keys keep their defaults
        assert_eq!(config.scan.old_file_days, 180);
        assert_eq!(config.backup.copy_concurrency, 4);
        Ok(())
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.scan.workers = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_rejects_bad_glob() {
        let mut config = ScanConfig::default();
        config.ignore_patterns.push("[".to_string());
        assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
    }
}
