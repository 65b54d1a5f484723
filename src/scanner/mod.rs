//! Concurrent directory scanner.
//!
//! One walker thread feeds regular file paths into a bounded [`queue`]; a
//! fixed pool of workers hashes, classifies and measures each file and emits
//! [`ScanEvent`]s. The calling thread is the only aggregator: it drains the
//! event channel until every sender has gone and then builds the
//! [`ScanResult`].

pub mod queue;
pub mod result;

pub use queue::{Pop, QueueConsumer, QueueProducer, ScanTask};
pub use result::{LargeFile, OldFile, ResultAggregator, ScanEvent, ScanResult, SkippedFile};

use crate::cancel::CancellationToken;
use crate::classify::classify;
use crate::config::ScanConfig;
use crate::fingerprint::FileHasher;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{self as channel, Sender};
use glob::Pattern;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, span, warn, Level};
use walkdir::WalkDir;

/// Scanner for duplicate, large and stale files
#[derive(Debug)]
pub struct ScanEngine {
    config: ScanConfig,
    ignore_patterns: Vec<Pattern>,
    hasher: FileHasher,
    current: Mutex<CancellationToken>,
}

impl ScanEngine {
    /// Create a scan engine; fails on invalid configuration
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;

        let ignore_patterns = config
            .ignore_patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Configuration {
                reason: format!("invalid ignore pattern: {}", e),
            })?;
        let hasher = FileHasher::new(config.hash_algorithm, config.block_size);

        Ok(Self {
            config,
            ignore_patterns,
            hasher,
            current: Mutex::new(CancellationToken::new()),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Cancel every scan running through [`ScanEngine::scan`].
    ///
    /// A cancel that arrives before the scan has picked up its token still
    /// applies to it; the engine is rearmed once a cancelled scan returns.
    pub fn cancel(&self) {
        self.lock_current().cancel();
    }

    /// Scan a directory tree with the engine's own cancellation token
    pub fn scan<P: AsRef<Path>>(&self, root: P) -> Result<ScanResult> {
        let token = self.lock_current().clone();
        let outcome = self.scan_with_token(root, &token);

        let mut current = self.lock_current();
        if current.is_cancelled() && current.same_as(&token) {
            *current = CancellationToken::new();
        }
        outcome
    }

    /// Scan a directory tree, stopping early once `token` is cancelled.
    ///
    /// A cancelled scan returns [`Error::Cancelled`]; partial results are
    /// discarded.
    pub fn scan_with_token<P: AsRef<Path>>(
        &self,
        root: P,
        token: &CancellationToken,
    ) -> Result<ScanResult> {
        let root = root.as_ref();
        let span = span!(Level::INFO, "scan", root = %root.display());
        let _enter = span.enter();

        if !root.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("scan root is not a directory: {}", root.display()),
            )));
        }

        let workers = self.config.workers.max(1);
        info!("Scanning {} with {} workers", root.display(), workers);

        let (producer, consumer) = queue::work_queue(
            self.config.queue_capacity,
            self.config.poll_timeout(),
            token.clone(),
        );
        let (event_tx, event_rx) = channel::unbounded::<ScanEvent>();
        let now = Utc::now();

        let result = thread::scope(|scope| {
            let walker_events = event_tx.clone();
            scope.spawn(move || self.walk(root, producer, walker_events));

            for _ in 0..workers {
                let consumer = consumer.clone();
                let events = event_tx.clone();
                scope.spawn(move || self.work(consumer, events, now));
            }
            drop(consumer);
            drop(event_tx);

            let mut aggregator = ResultAggregator::new();
            for event in event_rx.iter() {
                aggregator.fold(event);
            }
            aggregator.finish()
        });

        if token.is_cancelled() {
            info!("Scan of {} cancelled", root.display());
            return Err(Error::Cancelled);
        }

        info!(
            "Scan completed: {} files, {} duplicate groups, {} large, {} old, {} skipped",
            result.files_scanned,
            result.duplicates.len(),
            result.large_files.len(),
            result.old_files.len(),
            result.skipped.len()
        );

        Ok(result)
    }

    fn lock_current(&self) -> MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer: walk the tree and enqueue every eligible regular file
    fn walk(&self, root: &Path, producer: QueueProducer, events: Sender<ScanEvent>) {
        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_ignored(entry.file_name()));

        for entry in walker {
            if producer.is_cancelled() {
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    let _ = events.send(ScanEvent::Warning(e.to_string()));
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() || !file_type.is_file() {
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!("Cannot stat {}: {}", entry.path().display(), e);
                    let _ = events.send(ScanEvent::Warning(e.to_string()));
                    continue;
                }
            };
            if size < self.config.min_file_size || size > self.config.max_file_size {
                debug!("Outside size bounds: {} ({} bytes)", entry.path().display(), size);
                continue;
            }

            let task = ScanTask {
                path: entry.into_path(),
            };
            if !producer.push(task) {
                break;
            }
        }

        debug!("Walker finished");
    }

    /// Consumer: process tasks until the queue is closed or cancelled
    fn work(&self, consumer: QueueConsumer, events: Sender<ScanEvent>, now: DateTime<Utc>) {
        while let Pop::Task(task) = consumer.pop() {
            match self.process(&task, now) {
                Ok(file_events) => {
                    for event in file_events {
                        let _ = events.send(event);
                    }
                }
                Err(e) => {
                    warn!("Skipping {}: {}", task.path.display(), e);
                    let _ = events.send(ScanEvent::Skipped(SkippedFile {
                        path: task.path,
                        reason: e.to_string(),
                    }));
                }
            }
        }
    }

    /// Every fallible step runs before any event is produced, so a file either
    /// contributes all of its events or is reported as skipped.
    fn process(&self, task: &ScanTask, now: DateTime<Utc>) -> Result<Vec<ScanEvent>> {
        let metadata = fs::metadata(&task.path)?;
        let size = metadata.len();
        let modified: DateTime<Utc> = DateTime::from(metadata.modified()?);
        let fingerprint = self.hasher.hash_file(&task.path)?;

        let mut events = Vec::with_capacity(5);
        events.push(ScanEvent::Fingerprint {
            fingerprint,
            path: task.path.clone(),
        });

        if let Some(category) = classify(&task.path) {
            events.push(ScanEvent::Classified {
                category,
                path: task.path.clone(),
            });
        }

        if size > self.config.large_file_threshold {
            events.push(ScanEvent::LargeFile(LargeFile {
                path: task.path.clone(),
                size,
            }));
        }

        if (now - modified).num_days() > i64::from(self.config.old_file_days) {
            events.push(ScanEvent::OldFile(OldFile {
                path: task.path.clone(),
                last_modified: modified,
            }));
        }

        events.push(ScanEvent::Processed);
        Ok(events)
    }

    fn is_ignored(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        self.ignore_patterns.iter().any(|p| p.matches(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn test_config() -> ScanConfig {
        ScanConfig {
            workers: 3,
            large_file_threshold: 1024,
            old_file_days: 180,
            ignore_patterns: Vec::new(),
            min_file_size: 0,
            poll_timeout_ms: 10,
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_duplicates_large_and_old() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::write(root.join("A.txt"), "hello")?;
        fs::write(root.join("B.txt"), "hello")?;
        fs::write(root.join("C.txt"), "world")?;
        fs::write(root.join("D.bin"), vec![7u8; 4096])?;
        fs::write(root.join("E.tmp"), "stale")?;
        let file = fs::File::options().write(true).open(root.join("E.tmp"))?;
        file.set_modified(SystemTime::now() - Duration::from_secs(200 * 24 * 3600))?;
        drop(file);

        let engine = ScanEngine::new(test_config())?;
        let result = engine.scan(root)?;

        assert_eq!(result.files_scanned, 5);
        assert_eq!(result.duplicates.len(), 1);
        let group = result.duplicates.values().next().unwrap();
        assert_eq!(group, &vec![root.join("A.txt"), root.join("B.txt")]);

        assert_eq!(result.large_files.len(), 1);
        assert_eq!(result.large_files[0].path, root.join("D.bin"));
        assert_eq!(result.large_files[0].size, 4096);

        assert_eq!(result.old_files.len(), 1);
        assert_eq!(result.old_files[0].path, root.join("E.tmp"));

        assert_eq!(result.category(Category::Documents).len(), 3);
        assert!(!result.is_partial());
        Ok(())
    }

    #[test]
    fn test_ignore_patterns_and_size_bounds() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir(root.join(".cache"))?;
        fs::write(root.join(".cache").join("inner.txt"), "cached")?;
        fs::write(root.join("keep.txt"), "keep me")?;
        fs::write(root.join("scratch.tmp"), "scratch")?;
        fs::write(root.join("tiny.txt"), "x")?;

        let config = ScanConfig {
            ignore_patterns: vec![".*".to_string(), "*.tmp".to_string()],
            min_file_size: 2,
            ..test_config()
        };
        let result = ScanEngine::new(config)?.scan(root)?;

        assert_eq!(result.files_scanned, 1);
        assert_eq!(
            result.category(Category::Documents),
            &[root.join("keep.txt")]
        );
        Ok(())
    }

    #[test]
    fn test_ignore_does_not_apply_to_root() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join(".hidden-root");
        fs::create_dir(&root)?;
        fs::write(root.join("file.txt"), "content")?;

        let config = ScanConfig {
            ignore_patterns: vec![".*".to_string()],
            ..test_config()
        };
        let result = ScanEngine::new(config)?.scan(&root)?;
        assert_eq!(result.files_scanned, 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_skipped_unless_followed() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::write(root.join("real.txt"), "content")?;
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt"))?;

        let result = ScanEngine::new(test_config())?.scan(root)?;
        assert_eq!(result.files_scanned, 1);
        assert!(result.duplicates.is_empty());

        let config = ScanConfig {
            follow_symlinks: true,
            ..test_config()
        };
        let result = ScanEngine::new(config)?.scan(root)?;
        assert_eq!(result.files_scanned, 2);
        assert_eq!(result.duplicates.len(), 1);
        Ok(())
    }

    #[test]
    fn test_restartable() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), "same")?;
        fs::write(temp_dir.path().join("b.txt"), "same")?;

        let engine = ScanEngine::new(test_config())?;
        let first = engine.scan(temp_dir.path())?;
        let second = engine.scan(temp_dir.path())?;
        assert_eq!(first, second);
        assert_eq!(second.files_scanned, 2);
        Ok(())
    }

    #[test]
    fn test_pre_cancelled_token() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), "data")?;

        let engine = ScanEngine::new(test_config())?;
        let token = CancellationToken::new();
        token.cancel();
        let result = engine.scan_with_token(temp_dir.path(), &token);
        assert!(matches!(result, Err(Error::Cancelled)));

        // a later scan gets its own token
        assert_eq!(engine.scan(temp_dir.path())?.files_scanned, 1);
        Ok(())
    }

    #[test]
    fn test_engine_cancel_before_scan_starts() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), "data")?;

        let engine = ScanEngine::new(test_config())?;
        engine.cancel();
        assert!(matches!(engine.scan(temp_dir.path()), Err(Error::Cancelled)));

        // rearmed once the cancelled scan returned
        assert_eq!(engine.scan(temp_dir.path())?.files_scanned, 1);
        Ok(())
    }

    #[test]
    fn test_engine_cancel_right_after_spawn() -> Result<()> {
        let temp_dir = TempDir::new()?;
        for i in 0..2000 {
            fs::write(temp_dir.path().join(format!("f{:04}.dat", i)), i.to_string())?;
        }

        let config = ScanConfig {
            queue_capacity: 4,
            ..test_config()
        };
        let engine = ScanEngine::new(config)?;
        let root = temp_dir.path();
        let result = thread::scope(|scope| {
            let handle = scope.spawn(|| engine.scan(root));
            engine.cancel();
            handle.join().unwrap()
        });
        assert!(matches!(result, Err(Error::Cancelled)));
        Ok(())
    }

    #[test]
    fn test_missing_root() -> Result<()> {
        let engine = ScanEngine::new(test_config())?;
        let result = engine.scan(PathBuf::from("/no/such/dir/for/nova"));
        assert!(matches!(result, Err(Error::Io(_))));
        Ok(())
    }
}
