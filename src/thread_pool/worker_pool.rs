use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use serde::Serialize;

use super::results::ResultReceiver;
use super::worker::{Shared, Worker};
use super::ThreadPool;
use crate::config::{FullPolicy, PoolConfig, QueueMode};
use crate::error::TaskError;
use crate::task::{Completion, Job, TaskId};
use crate::{PoolError, Result};

/// Lifecycle of a `WorkerPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Accepting submissions.
    Running,
    /// Rejecting submissions while workers drain the queue.
    ShuttingDown,
    /// Every worker has exited.
    Stopped,
}

/// A point-in-time snapshot of pool counters.
///
/// `completed` counts every finished job, successful or not; `failed` is
/// the subset that panicked or returned an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Configured number of workers.
    pub size: usize,
    /// Workers currently alive.
    pub live_workers: usize,
    /// Jobs accepted into the queue.
    pub submitted: u64,
    /// Jobs that finished running.
    pub completed: u64,
    /// Finished jobs that failed.
    pub failed: u64,
    /// Submissions refused with `PoolClosed` or `QueueFull`.
    pub rejected: u64,
    /// Jobs waiting in the queue.
    pub queued: usize,
}

/// A fixed-size pool of worker threads with a result channel.
///
/// Workers pull jobs from a single MPMC queue. Each task submitted with
/// [`submit`](WorkerPool::submit) gets a [`TaskId`] and its outcome is
/// published on the result channel, available through
/// [`results`](WorkerPool::results). A panicking task is reported as
/// [`TaskError::Panicked`] and never takes its worker down.
///
/// Dropping the pool shuts it down and waits for queued work to finish.
pub struct WorkerPool<R: Send + 'static = ()> {
    size: usize,
    /// `None` once shutdown began; dropping the last sender closes the queue.
    queue: RwLock<Option<Sender<Job<R>>>>,
    on_full: Option<FullPolicy>,
    backlog: Receiver<Job<R>>,
    results: Receiver<Completion<R>>,
    next_id: AtomicU64,
    shared: Arc<Shared>,
}

impl<R: Send + 'static> WorkerPool<R> {
    /// Creates a pool of `size` workers with an unbounded queue.
    pub fn new(size: usize) -> Result<Self> {
        Self::with_config(PoolConfig::new(size))
    }

    /// Creates a pool from a full configuration.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        if config.size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let (job_tx, job_rx, on_full) = match config.queue {
            QueueMode::Unbounded => {
                let (tx, rx) = channel::unbounded();
                (tx, rx, None)
            }
            QueueMode::Bounded { capacity, on_full } => {
                let (tx, rx) = channel::bounded(capacity);
                (tx, rx, Some(on_full))
            }
        };
        let (result_tx, result_rx) = channel::unbounded();
        let shared = Arc::new(Shared::new(config.thread_name));

        let pool = WorkerPool {
            size: config.size,
            queue: RwLock::new(Some(job_tx)),
            on_full,
            backlog: job_rx.clone(),
            results: result_rx,
            next_id: AtomicU64::new(0),
            shared: Arc::clone(&shared),
        };

        // On error the partially built pool is dropped, which joins the
        // workers spawned so far.
        for id in 0..config.size {
            Worker::spawn(id, job_rx.clone(), result_tx.clone(), Arc::clone(&shared))?;
        }

        info!(
            "Worker pool started with {} threads ({:?} queue)",
            config.size, config.queue
        );
        Ok(pool)
    }

    /// Submits a task; its value is published on the result channel.
    ///
    /// # Errors
    ///
    /// `PoolClosed` once shutdown has begun, `QueueFull` if the bounded
    /// queue is full and the pool rejects on full. A rejected task is
    /// never run.
    pub fn submit<F>(&self, task: F) -> Result<TaskId>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        self.enqueue(|id| Job::Task {
            id,
            run: Box::new(move || Ok::<_, TaskError>(task())),
        })
    }

    /// Submits a task that can fail.
    ///
    /// An `Err` returned by the task is delivered as `TaskError::Failed`.
    pub fn submit_fallible<F, E>(&self, task: F) -> Result<TaskId>
    where
        F: FnOnce() -> std::result::Result<R, E> + Send + 'static,
        E: Display,
    {
        self.enqueue(|id| Job::Task {
            id,
            run: Box::new(move || task().map_err(|e| TaskError::Failed(e.to_string()))),
        })
    }

    fn enqueue(&self, make_job: impl FnOnce(TaskId) -> Job<R>) -> Result<TaskId> {
        // Clone the sender so a blocked submitter never holds the lock.
        let tx = match self.queue.read()?.as_ref() {
            Some(tx) => tx.clone(),
            None => {
                self.shared.rejected.fetch_add(1, Ordering::SeqCst);
                warn!("Rejected submission: pool is shutting down");
                return Err(PoolError::PoolClosed);
            }
        };

        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let job = make_job(id);

        let sent = match self.on_full {
            Some(FullPolicy::Reject) => tx.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => PoolError::QueueFull,
                TrySendError::Disconnected(_) => PoolError::PoolClosed,
            }),
            _ => tx.send(job).map_err(|_| PoolError::PoolClosed),
        };

        match sent {
            Ok(()) => {
                self.shared.submitted.fetch_add(1, Ordering::SeqCst);
                debug!("Queued task {id}");
                Ok(id)
            }
            Err(e) => {
                self.shared.rejected.fetch_add(1, Ordering::SeqCst);
                warn!("Rejected task {id}: {e}");
                Err(e)
            }
        }
    }

    /// Stops accepting submissions.
    ///
    /// Queued and running tasks still complete. With `wait`, blocks until
    /// every worker has exited; otherwise returns at once and
    /// [`join`](WorkerPool::join) can be called later. Calling it again
    /// only adds the wait, if requested.
    pub fn shutdown(&self, wait: bool) -> Result<()> {
        let closed = self.queue.write()?.take();
        if let Some(tx) = closed {
            drop(tx);
            info!(
                "Shutting down worker pool, {} jobs left to drain",
                self.backlog.len()
            );
        }
        if wait {
            self.join()?;
        }
        Ok(())
    }

    /// Blocks until every worker thread has exited.
    ///
    /// Workers only exit after shutdown, so on a running pool this waits
    /// for another thread to call [`shutdown`](WorkerPool::shutdown).
    /// Any number of threads may join at once; each returns only when the
    /// pool is stopped. Called from inside a task, it waits for every
    /// worker but the calling one.
    pub fn join(&self) -> Result<()> {
        let current = thread::current().id();
        while let Some(handle) = self.shared.pop_handle() {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("Worker thread terminated with a panic");
            }
        }

        let remaining = if self.shared.is_current_worker() {
            warn!("join called from a worker thread, not waiting for itself");
            1
        } else {
            0
        };
        // Handles popped by a concurrent joiner are still running.
        self.shared.wait_for_exit(remaining);
        debug!("All worker threads joined");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        let accepting = self.queue.read().map(|q| q.is_some()).unwrap_or(false);
        if accepting {
            PoolState::Running
        } else if self.shared.live_workers() == 0 {
            PoolState::Stopped
        } else {
            PoolState::ShuttingDown
        }
    }

    /// Configured number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` if a running pool has lost workers it could not replace.
    pub fn is_degraded(&self) -> bool {
        self.state() == PoolState::Running
            && self.shared.live_workers() < self.size
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size,
            live_workers: self.shared.live_workers(),
            submitted: self.shared.submitted.load(Ordering::SeqCst),
            completed: self.shared.completed.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
            rejected: self.shared.rejected.load(Ordering::SeqCst),
            queued: self.backlog.len(),
        }
    }

    /// A handle on the result channel.
    pub fn results(&self) -> ResultReceiver<R> {
        ResultReceiver::new(self.results.clone())
    }
}

impl<R: Send + 'static> ThreadPool for WorkerPool<R> {
    fn new(threads: usize) -> Result<Self> {
        WorkerPool::new(threads)
    }

    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(|_| Job::Detached(Box::new(job))).map(|_| ())
    }
}

impl<R: Send + 'static> Drop for WorkerPool<R> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown(true) {
            error!("Failed to shut down worker pool: {}", e);
        }
    }
}

/// Builder for a `WorkerPool`.
///
/// ```
/// use taskpool::{FullPolicy, PoolBuilder, WorkerPool};
///
/// let pool: WorkerPool<u32> = PoolBuilder::new()
///     .size(2)
///     .bounded(16, FullPolicy::Block)
///     .thread_name("doc-worker")
///     .build()
///     .unwrap();
/// let id = pool.submit(|| 6 * 7).unwrap();
/// let done = pool.results().recv().unwrap();
/// assert_eq!(done.id, id);
/// assert_eq!(done.outcome, Ok(42));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    /// Starts from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: PoolConfig) -> Self {
        Self { config }
    }

    /// Sets the number of worker threads.
    pub fn size(mut self, size: usize) -> Self {
        self.config.size = size;
        self
    }

    /// Uses an unbounded queue.
    pub fn unbounded(mut self) -> Self {
        self.config.queue = QueueMode::Unbounded;
        self
    }

    /// Limits the queue to `capacity` pending jobs.
    pub fn bounded(mut self, capacity: usize, on_full: FullPolicy) -> Self {
        self.config.queue = QueueMode::Bounded { capacity, on_full };
        self
    }

    /// Sets the worker thread name prefix.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name = prefix.into();
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Spawns the pool.
    pub fn build<R: Send + 'static>(self) -> Result<WorkerPool<R>> {
        WorkerPool::with_config(self.config)
    }
}
