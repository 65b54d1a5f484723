//! Scan events and the single-threaded aggregator that folds them

use crate::classify::Category;
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A file above the large-file threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LargeFile {
    pub path: PathBuf,
    pub size: u64,
}

/// A file older than the stale-file threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldFile {
    pub path: PathBuf,
    pub last_modified: DateTime<Utc>,
}

/// A file that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Message emitted by the walker and workers onto the result channel
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Fingerprint {
        fingerprint: Fingerprint,
        path: PathBuf,
    },
    Classified {
        category: Category,
        path: PathBuf,
    },
    LargeFile(LargeFile),
    OldFile(OldFile),
    /// One file finished processing
    Processed,
    Skipped(SkippedFile),
    /// Non-fatal traversal problem
    Warning(String),
}

/// Outcome of one scan invocation.
///
/// Duplicate groups always hold at least two paths. Paths inside a group are
/// sorted; which path was hashed first is not recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub duplicates: BTreeMap<Fingerprint, Vec<PathBuf>>,
    pub classified_files: BTreeMap<Category, Vec<PathBuf>>,
    pub large_files: Vec<LargeFile>,
    pub old_files: Vec<OldFile>,
    pub files_scanned: usize,
    pub skipped: Vec<SkippedFile>,
    pub warnings: Vec<String>,
}

impl ScanResult {
    /// Number of files in duplicate groups beyond the first of each group
    pub fn redundant_files(&self) -> usize {
        self.duplicates.values().map(|group| group.len() - 1).sum()
    }

    /// True if any file or directory was skipped because of an error
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty() || !self.warnings.is_empty()
    }

    pub fn category(&self, category: Category) -> &[PathBuf] {
        self.classified_files
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Folds events into a [`ScanResult`]. Owned by exactly one thread.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    occurrences: HashMap<Fingerprint, Vec<PathBuf>>,
    classified: BTreeMap<Category, Vec<PathBuf>>,
    large_files: Vec<LargeFile>,
    old_files: Vec<OldFile>,
    files_scanned: usize,
    skipped: Vec<SkippedFile>,
    warnings: Vec<String>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Fingerprint { fingerprint, path } => {
                self.occurrences.entry(fingerprint).or_default().push(path);
            }
            ScanEvent::Classified { category, path } => {
                self.classified.entry(category).or_default().push(path);
            }
            ScanEvent::LargeFile(file) => self.large_files.push(file),
            ScanEvent::OldFile(file) => self.old_files.push(file),
            ScanEvent::Processed => self.files_scanned += 1,
            ScanEvent::Skipped(file) => self.skipped.push(file),
            ScanEvent::Warning(message) => self.warnings.push(message),
        }
    }

    pub fn finish(self) -> ScanResult {
        let duplicates = self
            .occurrences
            .into_iter()
            .filter(|(_, paths)| paths.len() >= 2)
            .map(|(fingerprint, mut paths)| {
                paths.sort();
                (fingerprint, paths)
            })
            .collect();

        let mut classified_files = self.classified;
        for paths in classified_files.values_mut() {
            paths.sort();
        }

        let mut large_files = self.large_files;
        large_files.sort_by(|a, b| a.path.cmp(&b.path));
        let mut old_files = self.old_files;
        old_files.sort_by(|a, b| a.path.cmp(&b.path));
        let mut skipped = self.skipped;
        skipped.sort_by(|a, b| a.path.cmp(&b.path));

        ScanResult {
            duplicates,
            classified_files,
            large_files,
            old_files,
            files_scanned: self.files_scanned,
            skipped,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::HashAlgorithm;

    fn occurrence(content: &[u8], path: &str) -> ScanEvent {
        ScanEvent::Fingerprint {
            fingerprint: Fingerprint::from_bytes(HashAlgorithm::Blake3, content),
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_unique_fingerprints_are_not_duplicates() {
        let mut aggregator = ResultAggregator::new();
        aggregator.fold(occurrence(b"hello", "b"));
        aggregator.fold(occurrence(b"world", "c"));
        aggregator.fold(occurrence(b"hello", "a"));
        aggregator.fold(occurrence(b"hello", "d"));

        let result = aggregator.finish();
        assert_eq!(result.duplicates.len(), 1);
        let group = result.duplicates.values().next().unwrap();
        assert_eq!(
            group,
            &vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("d")]
        );
        assert_eq!(result.redundant_files(), 2);
    }

    #[test]
    fn test_counts_and_partial_flag() {
        let mut aggregator = ResultAggregator::new();
        aggregator.fold(ScanEvent::Processed);
        aggregator.fold(ScanEvent::Processed);
        aggregator.fold(ScanEvent::Classified {
            category: Category::Documents,
            path: PathBuf::from("a.txt"),
        });
        aggregator.fold(ScanEvent::Skipped(SkippedFile {
            path: PathBuf::from("locked"),
            reason: "permission denied".to_string(),
        }));

        let result = aggregator.finish();
        assert_eq!(result.files_scanned, 2);
        assert_eq!(result.category(Category::Documents), &[PathBuf::from("a.txt")]);
        assert!(result.category(Category::Images).is_empty());
        assert!(result.is_partial());
    }
}
