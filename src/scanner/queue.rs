//! Bounded work queue between the tree walker and the hashing workers

use crate::cancel::CancellationToken;
use crossbeam_channel::{self as channel, RecvTimeoutError, SendTimeoutError};
use std::path::PathBuf;
use std::time::Duration;

/// A regular file discovered by the walker, consumed by exactly one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTask {
    pub path: PathBuf,
}

/// Outcome of a bounded-wait dequeue
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    Task(ScanTask),
    /// The queue is drained and closed, or the scan was cancelled
    Done,
}

/// Create a queue holding at most `capacity` pending tasks.
///
/// The walker keeps the single [`QueueProducer`]; dropping it marks traversal
/// as finished. Workers share clones of the [`QueueConsumer`].
pub fn work_queue(
    capacity: usize,
    poll_timeout: Duration,
    token: CancellationToken,
) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = channel::bounded(capacity.max(1));
    (
        QueueProducer {
            tx,
            token: token.clone(),
            poll_timeout,
        },
        QueueConsumer {
            rx,
            token,
            poll_timeout,
        },
    )
}

/// Sending half, owned by the walker
#[derive(Debug)]
pub struct QueueProducer {
    tx: channel::Sender<ScanTask>,
    token: CancellationToken,
    poll_timeout: Duration,
}

impl QueueProducer {
    /// Enqueue a task, waiting while the queue is full.
    ///
    /// Returns `false` if the scan was cancelled or every consumer has gone
    /// away; the task is dropped in that case.
    pub fn push(&self, task: ScanTask) -> bool {
        let mut task = task;
        loop {
            if self.token.is_cancelled() {
                return false;
            }
            match self.tx.send_timeout(task, self.poll_timeout) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => task = returned,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Receiving half, cloned into every worker
#[derive(Debug, Clone)]
pub struct QueueConsumer {
    rx: channel::Receiver<ScanTask>,
    token: CancellationToken,
    poll_timeout: Duration,
}

impl QueueConsumer {
    /// Bounded-wait dequeue.
    ///
    /// Waits at most one poll interval at a time, re-checking the cancellation
    /// token between waits. Never spins and never blocks past a cancellation
    /// by more than `poll_timeout`.
    pub fn pop(&self) -> Pop {
        loop {
            if self.token.is_cancelled() {
                return Pop::Done;
            }
            match self.rx.recv_timeout(self.poll_timeout) {
                Ok(task) => return Pop::Task(task),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Pop::Done,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
