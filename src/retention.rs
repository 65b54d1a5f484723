//! Age-based retention rule for backup records

use crate::backup::BackupRecord;
use crate::config::BackupConfig;
use chrono::NaiveDateTime;

/// Selects records whose age in whole days is strictly greater than the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    retention_days: u32,
}

impl RetentionPolicy {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(config.retention_days)
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Whole days elapsed between `created` and `now`, truncated
    pub fn age_days(created: NaiveDateTime, now: NaiveDateTime) -> i64 {
        (now - created).num_days()
    }

    pub fn is_expired(&self, created: NaiveDateTime, now: NaiveDateTime) -> bool {
        Self::age_days(created, now) > i64::from(self.retention_days)
    }

    /// Records eligible for deletion at `now`, in history order
    pub fn select_expired<'a>(
        &self,
        records: &'a [BackupRecord],
        now: NaiveDateTime,
    ) -> Vec<&'a BackupRecord> {
        records
            .iter()
            .filter(|record| self.is_expired(record.timestamp, now))
            .collect()
    }
}
