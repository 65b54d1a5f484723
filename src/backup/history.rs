//! Backup records and the persisted history log

use crate::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use sysinfo::System;
use tracing::{debug, warn};

/// On-disk timestamp format of history and recovery entries
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Serde adapter for `YYYYMMDD_HHMMSS` timestamps
pub mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Description of the machine a backup was taken on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostInfo {
    pub os: String,
    pub family: String,
    pub arch: String,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu_count: usize,
    /// Physical memory in bytes
    pub total_memory: u64,
    pub hostname: Option<String>,
}

impl HostInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        Self {
            os: std::env::consts::OS.to_string(),
            family: std::env::consts::FAMILY.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            os_version: System::long_os_version(),
            kernel_version: System::kernel_version(),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            total_memory: sys.total_memory(),
            hostname: System::host_name(),
        }
    }
}

/// Durable metadata for one completed backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub name: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub size_bytes: u64,
    pub file_count: usize,
    pub compressed: bool,
    pub storage_path: PathBuf,
    pub host_info: HostInfo,
}

/// Ordered list of backup records, stored as `{"backups": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHistory {
    pub backups: Vec<BackupRecord>,
}

impl BackupHistory {
    /// Load the history, starting empty if the file is missing or unreadable
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No history at {}, starting empty", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(history) => Ok(history),
            Err(e) => {
                warn!("Ignoring unreadable history {}: {}", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    /// Write the full history, replacing the previous file atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json_atomic(path.as_ref(), self)
    }

    pub fn find(&self, name: &str) -> Option<&BackupRecord> {
        self.backups.iter().find(|b| b.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<BackupRecord> {
        let index = self.backups.iter().position(|b| b.name == name)?;
        Some(self.backups.remove(index))
    }

    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }
}

/// Serialize `value` to a sibling temp file, sync it, then rename it over
/// `path`. Readers see either the old or the new document.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    fs::rename(&tmp_path, path)?;
    Ok(())
}
