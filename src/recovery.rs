//! Pre-delete safety copies and their recovery log

use crate::backup::copy::copy_file;
use crate::backup::history::{timestamp_format, write_json_atomic};
use crate::backup::TIMESTAMP_FORMAT;
use crate::retention::RetentionPolicy;
use crate::{Error, Result};
use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, span, warn, Level};

const RECOVERY_LOG: &str = "recovery_log.json";

/// A file copied aside before deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryEntry {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
}

type Entries = BTreeMap<PathBuf, RecoveryEntry>;

/// Keeps one safety copy per original path in `dir`, tracked by
/// `dir/recovery_log.json`
#[derive(Debug)]
pub struct RecoveryLog {
    dir: PathBuf,
    entries: Mutex<Entries>,
}

impl RecoveryLog {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let entries = load_entries(&dir.join(RECOVERY_LOG))?;
        debug!("Recovery log in {} holds {} entries", dir.display(), entries.len());
        Ok(Self {
            dir,
            entries: Mutex::new(entries),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `path` aside before it is deleted.
    ///
    /// Returns `None` if there is no such file. A second copy of the same
    /// original replaces the first.
    pub fn backup_before_delete<P: AsRef<Path>>(&self, path: P) -> Result<Option<PathBuf>> {
        let path = path.as_ref();
        if !path.is_file() {
            debug!("Nothing to back up at {}", path.display());
            return Ok(None);
        }

        let original = entry_key(path)?;
        let timestamp = Local::now().naive_local().trunc_subsecs(0);
        let mut entries = self.lock_entries();

        let backup_path = self.unused_backup_path(&original, timestamp)?;
        copy_file(&original, &backup_path)?;

        let entry = RecoveryEntry {
            original_path: original.clone(),
            backup_path: backup_path.clone(),
            timestamp,
        };
        let previous = entries.insert(original.clone(), entry);
        if let Err(e) = self.persist(&entries) {
            match previous.clone() {
                Some(previous) => entries.insert(original, previous),
                None => entries.remove(&original),
            };
            remove_copy(&backup_path);
            return Err(e);
        }

        if let Some(previous) = previous {
            remove_copy(&previous.backup_path);
        }
        info!("Saved {} to {}", path.display(), backup_path.display());
        Ok(Some(backup_path))
    }

    /// Copy a saved file back to its original location and forget it
    pub fn recover_file<P: AsRef<Path>>(&self, original: P) -> Result<PathBuf> {
        let original = entry_key(original.as_ref())?;
        let span = span!(Level::INFO, "recover_file", path = %original.display());
        let _enter = span.enter();

        let mut entries = self.lock_entries();
        let entry = entries
            .get(&original)
            .cloned()
            .ok_or_else(|| Error::RecoveryEntryNotFound {
                path: original.clone(),
            })?;
        if !entry.backup_path.is_file() {
            return Err(Error::MissingStorage {
                name: original.display().to_string(),
                path: entry.backup_path,
            });
        }

        if let Some(parent) = entry.original_path.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_file(&entry.backup_path, &entry.original_path)?;

        entries.remove(&original);
        if let Err(e) = self.persist(&entries) {
            entries.insert(original, entry);
            return Err(e);
        }
        remove_copy(&entry.backup_path);

        info!("Recovered {}", entry.original_path.display());
        Ok(entry.original_path)
    }

    /// Entries ordered by original path
    pub fn list_recoverable(&self) -> Vec<RecoveryEntry> {
        self.lock_entries().values().cloned().collect()
    }

    /// Drop entries older than `days` whole days, deleting their copies
    pub fn cleanup_old(&self, days: u32) -> Result<usize> {
        self.cleanup_expired_at(days, Local::now().naive_local())
    }

    pub fn cleanup_expired_at(&self, days: u32, now: NaiveDateTime) -> Result<usize> {
        let policy = RetentionPolicy::new(days);
        let mut entries = self.lock_entries();

        let expired: Vec<PathBuf> = entries
            .values()
            .filter(|entry| policy.is_expired(entry.timestamp, now))
            .map(|entry| entry.original_path.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        for original in &expired {
            if let Some(entry) = entries.remove(original) {
                remove_copy(&entry.backup_path);
            }
        }
        self.persist(&entries)?;

        info!("Removed {} expired recovery entries", expired.len());
        Ok(expired.len())
    }

    fn unused_backup_path(&self, original: &Path, timestamp: NaiveDateTime) -> Result<PathBuf> {
        let name = original
            .file_name()
            .ok_or_else(|| Error::Configuration {
                reason: format!("{} has no file name", original.display()),
            })?
            .to_string_lossy();
        let base = format!("{}_{}", name, timestamp.format(TIMESTAMP_FORMAT));

        let mut candidate = self.dir.join(&base);
        let mut suffix = 1;
        while candidate.exists() {
            candidate = self.dir.join(format!("{}_{}", base, suffix));
            suffix += 1;
        }
        Ok(candidate)
    }

    fn persist(&self, entries: &Entries) -> Result<()> {
        write_json_atomic(&self.dir.join(RECOVERY_LOG), entries)
    }

    fn lock_entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_entries(path: &Path) -> Result<Entries> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            warn!("Ignoring unreadable recovery log {}: {}", path.display(), e);
            Ok(Entries::new())
        }
    }
}

/// Absolute form of `path` with its parent directory resolved, so a file
/// can be found again after it has been deleted
fn entry_key(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match fs::canonicalize(parent) {
            Ok(parent) => Ok(parent.join(name)),
            Err(_) => Ok(absolute),
        },
        _ => Ok(absolute),
    }
}

fn remove_copy(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!("Cannot remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_backup_and_recover() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let log = RecoveryLog::open(temp_dir.path().join("recovery"))?;
        let target = temp_dir.path().join("docs").join("report.txt");
        fs::create_dir_all(target.parent().unwrap())?;
        fs::write(&target, "quarterly numbers")?;

        let saved = log.backup_before_delete(&target)?.unwrap();
        assert!(saved.is_file());
        assert!(saved
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("report.txt_"));
        fs::remove_file(&target)?;

        assert_eq!(log.list_recoverable().len(), 1);
        let restored = log.recover_file(&target)?;
        assert_eq!(fs::read_to_string(&restored)?, "quarterly numbers");
        assert!(log.list_recoverable().is_empty());
        assert!(!saved.exists());
        Ok(())
    }

    #[test]
    fn test_recovered_file_keeps_mtime() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let log = RecoveryLog::open(temp_dir.path().join("recovery"))?;
        let target = temp_dir.path().join("ledger.csv");
        fs::write(&target, "a,b")?;
        let written = std::time::SystemTime::now() - std::time::Duration::from_secs(90 * 24 * 3600);
        File::options().write(true).open(&target)?.set_modified(written)?;

        let saved = log.backup_before_delete(&target)?.unwrap();
        assert_eq!(fs::metadata(&saved)?.modified()?, written);
        fs::remove_file(&target)?;

        let restored = log.recover_file(&target)?;
        assert_eq!(fs::metadata(&restored)?.modified()?, written);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_not_backed_up() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let log = RecoveryLog::open(temp_dir.path())?;
        assert_eq!(log.backup_before_delete(temp_dir.path().join("nope"))?, None);
        assert!(log.list_recoverable().is_empty());
        Ok(())
    }

    #[test]
    fn test_rebackup_replaces_entry() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let log = RecoveryLog::open(temp_dir.path().join("recovery"))?;
        let target = temp_dir.path().join("a.txt");

        fs::write(&target, "first")?;
        let first = log.backup_before_delete(&target)?.unwrap();
        fs::write(&target, "second")?;
        let second = log.backup_before_delete(&target)?.unwrap();

        assert_ne!(first, second);
        assert!(!first.exists());
        let entries = log.list_recoverable();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].backup_path, second);
        assert_eq!(fs::read_to_string(&second)?, "second");
        Ok(())
    }

    #[test]
    fn test_recover_errors() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let log = RecoveryLog::open(temp_dir.path().join("recovery"))?;
        let target = temp_dir.path().join("b.txt");

        assert!(matches!(
            log.recover_file(&target),
            Err(Error::RecoveryEntryNotFound { .. })
        ));

        fs::write(&target, "data")?;
        let saved = log.backup_before_delete(&target)?.unwrap();
        fs::remove_file(&saved)?;
        assert!(matches!(
            log.recover_file(&target),
            Err(Error::MissingStorage { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_log_persists_and_expires() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().join("recovery");
        let target = temp_dir.path().join("c.txt");
        fs::write(&target, "keep")?;

        let saved = RecoveryLog::open(&dir)?.backup_before_delete(&target)?.unwrap();
        let log = RecoveryLog::open(&dir)?;
        let entries = log.list_recoverable();
        assert_eq!(entries.len(), 1);

        let created = entries[0].timestamp;
        assert_eq!(log.cleanup_expired_at(7, created + Duration::days(7))?, 0);
        assert_eq!(log.cleanup_expired_at(7, created + Duration::days(8))?, 1);
        assert!(!saved.exists());
        assert!(RecoveryLog::open(&dir)?.list_recoverable().is_empty());
        Ok(())
    }
}
