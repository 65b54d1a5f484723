//! Periodic backups on a dedicated background thread

use crate::backup::BackupManager;
use crate::cancel::CancellationToken;
use crate::config::BackupConfig;
use crate::{Error, Result};
use chrono::{DateTime, Local};
use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, span, warn, Level};

/// Longest the loop sleeps before re-checking its stop flag
const MAX_TICK: Duration = Duration::from_secs(60);

const THREAD_NAME: &str = "backup_scheduler";

struct RunningJob {
    token: CancellationToken,
    wake: Sender<()>,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Runs `create_backup` on a fixed interval until stopped.
///
/// At most one job runs at a time; starting again replaces the current job.
pub struct Scheduler {
    manager: Arc<BackupManager>,
    interval: Duration,
    stop_timeout: Duration,
    next_run: Arc<Mutex<Option<DateTime<Local>>>>,
    running: Mutex<Option<RunningJob>>,
}

impl Scheduler {
    /// Interval is `backup_interval_secs` in whole hours, at least one hour
    pub fn new(manager: Arc<BackupManager>, config: &BackupConfig) -> Self {
        let hours = (config.backup_interval_secs / 3600).max(1);
        Self::with_interval(
            manager,
            Duration::from_secs(hours * 3600),
            config.stop_timeout(),
        )
    }

    pub fn with_interval(
        manager: Arc<BackupManager>,
        interval: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            interval,
            stop_timeout,
            next_run: Arc::new(Mutex::new(None)),
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start backing up `sources` every interval, replacing any running job.
    /// The first backup happens one interval from now.
    pub fn start(&self, sources: Vec<PathBuf>) -> Result<()> {
        if sources.is_empty() {
            return Err(Error::Scheduling {
                reason: "no backup sources given".to_string(),
            });
        }
        self.stop();

        let token = CancellationToken::new();
        let (wake_tx, wake_rx) = channel::bounded(1);
        let (done_tx, done_rx) = channel::bounded(1);

        let job = Job {
            manager: Arc::clone(&self.manager),
            sources,
            interval: self.interval,
            token: token.clone(),
            wake: wake_rx,
            next_run: Arc::clone(&self.next_run),
        };
        *self.lock_next_run() = next_run_at(self.interval);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                job.run();
                let _ = done_tx.send(());
            })
            .map_err(|e| Error::Scheduling {
                reason: format!("cannot spawn scheduler thread: {}", e),
            })?;

        *self.lock_running() = Some(RunningJob {
            token,
            wake: wake_tx,
            done: done_rx,
            handle,
        });
        info!("Scheduler started, interval {:?}", self.interval);
        Ok(())
    }

    /// Stop the running job. A no-op when nothing is running.
    ///
    /// Waits at most the stop timeout for the thread to exit; a thread still
    /// busy with a backup after that is left to finish on its own.
    pub fn stop(&self) {
        let Some(job) = self.lock_running().take() else {
            *self.lock_next_run() = None;
            debug!("Scheduler not running");
            return;
        };

        job.token.cancel();
        let _ = job.wake.try_send(());

        match job.done.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if job.handle.join().is_err() {
                    warn!("Scheduler thread panicked");
                }
                info!("Scheduler stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Scheduler thread did not exit within {:?}, detaching",
                    self.stop_timeout
                );
            }
        }
        *self.lock_next_run() = None;
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// When the next backup is due, if a job is running
    pub fn next_run(&self) -> Option<DateTime<Local>> {
        *self.lock_next_run()
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningJob>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_next_run(&self) -> MutexGuard<'_, Option<DateTime<Local>>> {
        self.next_run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the background thread
struct Job {
    manager: Arc<BackupManager>,
    sources: Vec<PathBuf>,
    interval: Duration,
    token: CancellationToken,
    wake: Receiver<()>,
    next_run: Arc<Mutex<Option<DateTime<Local>>>>,
}

impl Job {
    fn run(&self) {
        let span = span!(Level::INFO, "backup_scheduler", sources = self.sources.len());
        let _enter = span.enter();

        let mut due = self.schedule_next();

        loop {
            let wait = due.saturating_duration_since(Instant::now()).min(MAX_TICK);
            match self.wake.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if self.token.is_cancelled() {
                break;
            }
            if Instant::now() < due {
                continue;
            }

            match self.manager.create_backup(&self.sources, None) {
                Ok(record) => info!("Scheduled backup '{}' completed", record.name),
                Err(e) => error!("Scheduled backup failed: {}", e),
            }
            if self.token.is_cancelled() {
                break;
            }
            due = self.schedule_next();
        }

        debug!("Scheduler loop exited");
    }

    fn schedule_next(&self) -> Instant {
        *self.next_run.lock().unwrap_or_else(PoisonError::into_inner) = next_run_at(self.interval);
        Instant::now() + self.interval
    }
}

fn next_run_at(interval: Duration) -> Option<DateTime<Local>> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|interval| Local::now().checked_add_signed(interval))
}
