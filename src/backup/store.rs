//! On-disk layout of the backup store

use crate::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const HISTORY_FILE: &str = "backup_log.json";
const STAGING_PREFIX: &str = ".staging-";
const ARCHIVE_EXTENSION: &str = "zip";

/// Directory holding backup archives, uncompressed trees and the history log.
///
/// ```text
/// <root>/
///   backup_log.json
///   <name>.zip          compressed backup
///   <name>/             uncompressed backup
///   .staging-<uuid>/    in-flight copy, removed on completion
/// ```
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    /// Open (creating if needed) a store and clear staging left by interrupted runs
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = fs::canonicalize(root.as_ref())?;
        let store = Self { root };
        store.remove_stale_staging()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, ARCHIVE_EXTENSION))
    }

    pub fn tree_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// A fresh staging directory path; the directory is not created
    pub fn new_staging_dir(&self) -> PathBuf {
        self.root.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()))
    }

    /// True if either artifact form of `name` is present on disk
    pub fn artifact_exists(&self, name: &str) -> bool {
        self.archive_path(name).exists() || self.tree_path(name).exists()
    }

    /// Delete a backup artifact. Returns `false` if it was already gone.
    pub fn remove_artifact(&self, path: &Path) -> Result<bool> {
        if !path.starts_with(&self.root) || path == self.root {
            return Err(Error::Configuration {
                reason: format!("refusing to delete {} outside the backup store", path.display()),
            });
        }

        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Artifact already absent: {}", path.display());
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        Ok(true)
    }

    fn remove_stale_staging(&self) -> Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let is_staging = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(STAGING_PREFIX))
                .unwrap_or(false);
            if !is_staging {
                continue;
            }

            warn!("Removing interrupted staging area {}", entry.path().display());
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!("Cannot remove {}: {}", entry.path().display(), e);
            }
        }
        Ok(())
    }
}
