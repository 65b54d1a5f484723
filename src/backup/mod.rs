//! Backup manager: create, restore, verify and expire backups in a store.
//!
//! Every change to the backup history happens under one mutex that covers the
//! whole read-modify-persist cycle, and the history file is rewritten in full
//! before the call returns. The slow copy and compression work for a new
//! backup runs outside the lock against a name reserved up front.

pub mod archive;
pub mod copy;
pub mod history;
pub mod store;

pub use archive::{ArchiveCheck, ArchiveStats};
pub use history::{BackupHistory, BackupRecord, HostInfo, TIMESTAMP_FORMAT};
pub use store::BackupStore;

use crate::config::BackupConfig;
use crate::retention::RetentionPolicy;
use crate::{Error, Result};
use chrono::{Local, NaiveDateTime, SubsecRound};
use copy::CopyEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, span, warn, Level};
use walkdir::WalkDir;

/// Outcome of a backup integrity check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Corrupted,
    /// The artifact could not be read at all
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub name: String,
    pub status: VerificationStatus,
    pub files_checked: usize,
    pub total_size: u64,
    pub errors: Vec<String>,
}

impl VerificationReport {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub files_restored: usize,
    pub bytes_restored: u64,
}

#[derive(Debug, Default)]
struct HistoryState {
    history: BackupHistory,
    /// Names of backups being built outside the lock
    reserved: HashSet<String>,
}

impl HistoryState {
    fn is_taken(&self, name: &str) -> bool {
        self.history.contains(name) || self.reserved.contains(name)
    }
}

/// Creates, restores, verifies and deletes backups in a [`BackupStore`]
#[derive(Debug)]
pub struct BackupManager {
    store: BackupStore,
    config: BackupConfig,
    retention: RetentionPolicy,
    state: Mutex<HistoryState>,
}

impl BackupManager {
    /// Open the store at `root`, loading any existing history
    pub fn open<P: AsRef<Path>>(root: P, config: BackupConfig) -> Result<Self> {
        config.validate()?;
        let store = BackupStore::open(root)?;
        let history = BackupHistory::load(store.history_path())?;
        info!(
            "Opened backup store {} with {} backups",
            store.root().display(),
            history.len()
        );

        Ok(Self {
            retention: RetentionPolicy::from_config(&config),
            store,
            config,
            state: Mutex::new(HistoryState {
                history,
                reserved: HashSet::new(),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Back up every regular file under `sources`.
    ///
    /// Without a `name` one is generated from the current time. The total size
    /// is checked against `max_backup_size` before anything is written.
    pub fn create_backup<P: AsRef<Path>>(
        &self,
        sources: &[P],
        name: Option<&str>,
    ) -> Result<BackupRecord> {
        let span = span!(Level::INFO, "create_backup", name = name.unwrap_or("<auto>"));
        let _enter = span.enter();

        if sources.is_empty() {
            return Err(Error::Configuration {
                reason: "no backup sources given".to_string(),
            });
        }

        let timestamp = Local::now().naive_local().trunc_subsecs(0);
        let sources: Vec<PathBuf> = sources.iter().map(|s| s.as_ref().to_path_buf()).collect();
        let entries = copy::plan_sources(&sources)?;
        let total: u64 = entries.iter().map(|e| e.size).sum();
        if total > self.config.max_backup_size {
            return Err(Error::SizeLimitExceeded {
                total,
                limit: self.config.max_backup_size,
            });
        }

        let name = self.reserve_name(name, timestamp)?;
        info!(
            "Backing up {} files ({} bytes) as '{}'",
            entries.len(),
            total,
            name
        );
        let built = self.build_artifact(&name, &entries);

        let mut state = self.lock_state();
        state.reserved.remove(&name);
        let storage_path = built?;

        let record = BackupRecord {
            name,
            timestamp,
            size_bytes: total,
            file_count: entries.len(),
            compressed: self.config.compression,
            storage_path,
            host_info: HostInfo::collect(),
        };
        state.history.backups.push(record.clone());
        if let Err(e) = state.history.save(self.store.history_path()) {
            state.history.backups.pop();
            if let Err(cleanup) = self.store.remove_artifact(&record.storage_path) {
                warn!(
                    "Cannot remove unrecorded artifact {}: {}",
                    record.storage_path.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        info!("Backup '{}' stored at {}", record.name, record.storage_path.display());
        Ok(record)
    }

    fn reserve_name(&self, requested: Option<&str>, timestamp: NaiveDateTime) -> Result<String> {
        let mut state = self.lock_state();

        let name = match requested {
            Some(name) => {
                validate_name(name)?;
                if state.is_taken(name) {
                    return Err(Error::BackupExists {
                        name: name.to_string(),
                    });
                }
                if self.store.artifact_exists(name) {
                    return Err(Error::Configuration {
                        reason: format!("an unrecorded artifact named '{}' is in the store", name),
                    });
                }
                name.to_string()
            }
            None => {
                let base = format!("backup_{}", timestamp.format(TIMESTAMP_FORMAT));
                let mut candidate = base.clone();
                let mut suffix = 1;
                while state.is_taken(&candidate) || self.store.artifact_exists(&candidate) {
                    candidate = format!("{}_{}", base, suffix);
                    suffix += 1;
                }
                candidate
            }
        };

        state.reserved.insert(name.clone());
        Ok(name)
    }

    /// Copy into a private staging area, then archive it or move it into place
    fn build_artifact(&self, name: &str, entries: &[CopyEntry]) -> Result<PathBuf> {
        let staging = self.store.new_staging_dir();
        fs::create_dir_all(&staging)?;

        let result = self.populate(name, entries, &staging);
        if result.is_err() && staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!("Cannot remove staging {}: {}", staging.display(), e);
            }
        }
        result
    }

    fn populate(&self, name: &str, entries: &[CopyEntry], staging: &Path) -> Result<PathBuf> {
        copy::copy_files(entries, staging, self.config.copy_concurrency)?;

        if self.config.compression {
            let archive_path = self.store.archive_path(name);
            archive::create_archive(staging, &archive_path)?;
            if let Err(e) = fs::remove_dir_all(staging) {
                warn!("Cannot remove staging {}: {}", staging.display(), e);
            }
            Ok(archive_path)
        } else {
            let tree_path = self.store.tree_path(name);
            fs::rename(staging, &tree_path)?;
            Ok(tree_path)
        }
    }

    /// Unpack or copy a backup into `dest`, creating it if needed
    pub fn restore_backup<P: AsRef<Path>>(&self, name: &str, dest: P) -> Result<RestoreSummary> {
        let dest = dest.as_ref();
        let span = span!(Level::INFO, "restore_backup", name = %name);
        let _enter = span.enter();

        let record = self.existing_backup(name)?;
        fs::create_dir_all(dest)?;

        let summary = if record.compressed {
            let stats = archive::extract_archive(&record.storage_path, dest)?;
            RestoreSummary {
                files_restored: stats.files,
                bytes_restored: stats.bytes,
            }
        } else {
            let entries = copy::plan_tree(&record.storage_path, Path::new(""))?;
            copy::copy_files(&entries, dest, self.config.copy_concurrency)?;
            RestoreSummary {
                files_restored: entries.len(),
                bytes_restored: entries.iter().map(|e| e.size).sum(),
            }
        };

        info!(
            "Restored {} files ({} bytes) from '{}' to {}",
            summary.files_restored,
            summary.bytes_restored,
            name,
            dest.display()
        );
        Ok(summary)
    }

    /// Check a backup's integrity.
    ///
    /// Corruption is reported through the status, never as an error.
    pub fn verify_backup(&self, name: &str) -> Result<VerificationReport> {
        let span = span!(Level::INFO, "verify_backup", name = %name);
        let _enter = span.enter();

        let record = self.existing_backup(name)?;
        let mut report = VerificationReport {
            name: record.name.clone(),
            status: VerificationStatus::Verified,
            files_checked: 0,
            total_size: 0,
            errors: Vec::new(),
        };

        if record.compressed {
            match archive::verify_archive(&record.storage_path) {
                Ok(check) => {
                    report.files_checked = check.stats.files;
                    report.total_size = check.stats.bytes;
                    report.errors = check.errors;
                }
                Err(e) => {
                    warn!("Cannot open archive {}: {}", record.storage_path.display(), e);
                    report.status = VerificationStatus::Failed;
                    report.errors.push(e.to_string());
                    return Ok(report);
                }
            }
        } else {
            verify_tree(&record.storage_path, &mut report);
        }

        if report.files_checked != record.file_count {
            report.errors.push(format!(
                "expected {} files, found {}",
                record.file_count, report.files_checked
            ));
        }
        if !report.errors.is_empty() {
            report.status = VerificationStatus::Corrupted;
            warn!("Backup '{}' is corrupted: {} problems", name, report.errors.len());
        } else {
            info!("Backup '{}' verified: {} files", name, report.files_checked);
        }

        Ok(report)
    }

    /// Delete every backup older than the retention window
    pub fn cleanup_old_backups(&self) -> Result<usize> {
        self.cleanup_expired_at(Local::now().naive_local())
    }

    /// Delete every backup that is expired at `now`.
    ///
    /// The pruned history is persisted before any storage is touched, so a
    /// failed save leaves both the history and the artifacts as they were.
    pub fn cleanup_expired_at(&self, now: NaiveDateTime) -> Result<usize> {
        let span = span!(Level::INFO, "cleanup_old_backups");
        let _enter = span.enter();

        let mut state = self.lock_state();
        let expired: Vec<BackupRecord> = self
            .retention
            .select_expired(&state.history.backups, now)
            .into_iter()
            .cloned()
            .collect();

        if expired.is_empty() {
            debug!("No backups older than {} days", self.retention.retention_days());
            return Ok(0);
        }

        let mut pruned = state.history.clone();
        for record in &expired {
            pruned.remove(&record.name);
        }
        pruned.save(self.store.history_path())?;
        state.history = pruned;

        for record in &expired {
            self.discard_artifact(record);
            info!("Removed expired backup '{}'", record.name);
        }
        Ok(expired.len())
    }

    /// Remove one backup and its storage
    pub fn delete_backup(&self, name: &str) -> Result<BackupRecord> {
        let mut state = self.lock_state();
        let mut pruned = state.history.clone();
        let record = pruned.remove(name).ok_or_else(|| Error::BackupNotFound {
            name: name.to_string(),
        })?;

        pruned.save(self.store.history_path())?;
        state.history = pruned;
        self.discard_artifact(&record);

        info!("Deleted backup '{}'", name);
        Ok(record)
    }

    /// Delete the storage of a record that is no longer in the history.
    /// A leftover artifact is unreachable, so failures only warn.
    fn discard_artifact(&self, record: &BackupRecord) {
        match self.store.remove_artifact(&record.storage_path) {
            Ok(true) => {}
            Ok(false) => debug!("Storage of '{}' was already gone", record.name),
            Err(e) => warn!(
                "Storage of '{}' left behind at {}: {}",
                record.name,
                record.storage_path.display(),
                e
            ),
        }
    }

    pub fn list_backups(&self) -> Vec<BackupRecord> {
        self.lock_state().history.backups.clone()
    }

    pub fn get_backup(&self, name: &str) -> Option<BackupRecord> {
        self.lock_state().history.find(name).cloned()
    }

    fn existing_backup(&self, name: &str) -> Result<BackupRecord> {
        let record = self.get_backup(name).ok_or_else(|| Error::BackupNotFound {
            name: name.to_string(),
        })?;
        if !record.storage_path.exists() {
            return Err(Error::MissingStorage {
                name: record.name,
                path: record.storage_path,
            });
        }
        Ok(record)
    }

    fn lock_state(&self) -> MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A backup name must be a single plain path component
fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    );
    if !single || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(Error::Configuration {
            reason: format!("invalid backup name '{}'", name),
        });
    }
    Ok(())
}

fn verify_tree(root: &Path, report: &mut VerificationReport) {
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.errors.push(e.to_string());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(metadata) => {
                report.files_checked += 1;
                report.total_size += metadata.len();
            }
            Err(e) => report
                .errors
                .push(format!("{}: {}", entry.path().display(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn config(compression: bool) -> BackupConfig {
        BackupConfig {
            compression,
            retention_days: 30,
            copy_concurrency: 2,
            ..BackupConfig::default()
        }
    }

    fn sources(dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir.join("photos"))?;
        fs::write(dir.join("notes.txt"), "meeting notes")?;
        fs::write(dir.join("photos").join("cat.jpg"), vec![1u8; 512])?;
        fs::write(dir.join("photos").join("dog.jpg"), vec![2u8; 256])?;
        Ok(vec![dir.join("notes.txt"), dir.join("photos")])
    }

    #[test]
    fn test_create_uncompressed_and_restore() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let manager = BackupManager::open(temp_dir.path().join("store"), config(false))?;

        let record = manager.create_backup(&srcs, Some("weekly"))?;
        assert_eq!(record.name, "weekly");
        assert_eq!(record.file_count, 3);
        assert_eq!(record.size_bytes, 13 + 512 + 256);
        assert!(!record.compressed);
        assert!(record.storage_path.join("photos").join("cat.jpg").is_file());
        assert_eq!(manager.list_backups(), vec![record.clone()]);

        let dest = temp_dir.path().join("restored");
        let summary = manager.restore_backup("weekly", &dest)?;
        assert_eq!(summary.files_restored, 3);
        assert_eq!(fs::read_to_string(dest.join("notes.txt"))?, "meeting notes");
        assert_eq!(fs::read(dest.join("photos").join("dog.jpg"))?, vec![2u8; 256]);
        Ok(())
    }

    #[test]
    fn test_history_survives_reopen() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let store = temp_dir.path().join("store");

        let record = BackupManager::open(&store, config(true))?.create_backup(&srcs, None)?;
        assert!(record.name.starts_with("backup_"));
        assert!(record.storage_path.extension().is_some_and(|ext| ext == "zip"));

        let reopened = BackupManager::open(&store, config(true))?;
        assert_eq!(reopened.get_backup(&record.name), Some(record));
        Ok(())
    }

    #[test]
    fn test_name_collisions() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let manager = BackupManager::open(temp_dir.path().join("store"), config(false))?;

        manager.create_backup(&srcs, Some("daily"))?;
        assert!(matches!(
            manager.create_backup(&srcs, Some("daily")),
            Err(Error::BackupExists { .. })
        ));

        let first = manager.create_backup(&srcs, None)?;
        let second = manager.create_backup(&srcs, None)?;
        assert_ne!(first.name, second.name);
        assert_eq!(manager.list_backups().len(), 3);

        for bad in ["", ".hidden", "a/b", ".."] {
            assert!(matches!(
                manager.create_backup(&srcs, Some(bad)),
                Err(Error::Configuration { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn test_size_limit_checked_before_copy() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let cfg = BackupConfig {
            max_backup_size: 100,
            ..config(false)
        };
        let manager = BackupManager::open(temp_dir.path().join("store"), cfg)?;

        let result = manager.create_backup(&srcs, Some("too-big"));
        assert!(matches!(
            result,
            Err(Error::SizeLimitExceeded { total: 781, limit: 100 })
        ));
        assert!(manager.list_backups().is_empty());

        let leftovers: Vec<_> = fs::read_dir(manager.root())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "backup_log.json")
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn test_not_found_and_missing_storage() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let manager = BackupManager::open(temp_dir.path().join("store"), config(true))?;

        assert!(matches!(
            manager.verify_backup("nope"),
            Err(Error::BackupNotFound { .. })
        ));

        let record = manager.create_backup(&srcs, Some("gone"))?;
        fs::remove_file(&record.storage_path)?;
        assert!(matches!(
            manager.restore_backup("gone", temp_dir.path().join("out")),
            Err(Error::MissingStorage { .. })
        ));
        assert!(matches!(
            manager.verify_backup("gone"),
            Err(Error::MissingStorage { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_verify_tree_detects_missing_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let manager = BackupManager::open(temp_dir.path().join("store"), config(false))?;
        let record = manager.create_backup(&srcs, Some("tree"))?;

        let report = manager.verify_backup("tree")?;
        assert!(report.is_verified());
        assert_eq!(report.files_checked, record.file_count);
        assert_eq!(report.total_size, record.size_bytes);

        fs::remove_file(record.storage_path.join("notes.txt"))?;
        let report = manager.verify_backup("tree")?;
        assert_eq!(report.status, VerificationStatus::Corrupted);
        assert_eq!(report.errors.len(), 1);
        Ok(())
    }

    #[test]
    fn test_verify_unreadable_archive_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let manager = BackupManager::open(temp_dir.path().join("store"), config(true))?;
        let record = manager.create_backup(&srcs, Some("broken"))?;

        fs::write(&record.storage_path, "not a zip")?;
        let report = manager.verify_backup("broken")?;
        assert_eq!(report.status, VerificationStatus::Failed);
        assert!(!report.errors.is_empty());
        Ok(())
    }

    #[test]
    fn test_delete_backup() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let manager = BackupManager::open(temp_dir.path().join("store"), config(false))?;
        let record = manager.create_backup(&srcs, Some("temp"))?;

        assert_eq!(manager.delete_backup("temp")?, record);
        assert!(!record.storage_path.exists());
        assert!(manager.list_backups().is_empty());
        assert!(matches!(
            manager.delete_backup("temp"),
            Err(Error::BackupNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_cleanup_respects_boundary() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let manager = BackupManager::open(temp_dir.path().join("store"), config(false))?;
        let record = manager.create_backup(&srcs, Some("aging"))?;

        let boundary = record.timestamp + Duration::days(30) + Duration::hours(12);
        assert_eq!(manager.cleanup_expired_at(boundary)?, 0);
        assert!(record.storage_path.exists());

        let expired = record.timestamp + Duration::days(31);
        assert_eq!(manager.cleanup_expired_at(expired)?, 1);
        assert!(!record.storage_path.exists());
        assert!(manager.list_backups().is_empty());

        let reopened = BackupManager::open(manager.root(), config(false))?;
        assert!(reopened.list_backups().is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_history_save_keeps_backups() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let srcs = sources(&temp_dir.path().join("data"))?;
        let manager = BackupManager::open(temp_dir.path().join("store"), config(false))?;
        let record = manager.create_backup(&srcs, Some("pinned"))?;

        let blocker = manager.root().join("backup_log.json.tmp");
        fs::create_dir(&blocker)?;

        assert!(manager.delete_backup("pinned").is_err());
        let expired = record.timestamp + Duration::days(31);
        assert!(manager.cleanup_expired_at(expired).is_err());

        assert!(record.storage_path.exists());
        assert_eq!(manager.get_backup("pinned"), Some(record.clone()));
        let reopened = BackupManager::open(manager.root(), config(false))?;
        assert_eq!(reopened.list_backups(), vec![record.clone()]);

        fs::remove_dir(&blocker)?;
        manager.delete_backup("pinned")?;
        assert!(!record.storage_path.exists());
        Ok(())
    }
}
