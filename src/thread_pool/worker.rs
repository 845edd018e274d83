use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, Sender};
use log::{debug, error, warn};

use crate::error::TaskError;
use crate::task::{discard_payload, panic_message, Completion, Job};
use crate::Result;

thread_local! {
    /// The pool the current thread works for, if any.
    static CURRENT_POOL: Cell<*const Shared> = const { Cell::new(ptr::null()) };
}

/// State shared between a pool and its workers.
pub(crate) struct Shared {
    pub(crate) thread_name: String,
    pub(crate) handles: Mutex<Vec<JoinHandle<()>>>,
    live_workers: Mutex<usize>,
    worker_exited: Condvar,
    pub(crate) submitted: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) rejected: AtomicU64,
}

impl Shared {
    pub(crate) fn new(thread_name: String) -> Self {
        Self {
            thread_name,
            handles: Mutex::new(Vec::new()),
            live_workers: Mutex::new(0),
            worker_exited: Condvar::new(),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Removes one worker handle, if any remain.
    pub(crate) fn pop_handle(&self) -> Option<JoinHandle<()>> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    pub(crate) fn live_workers(&self) -> usize {
        *self
            .live_workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn worker_started(&self) {
        *self
            .live_workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
    }

    pub(crate) fn worker_exited(&self) {
        let mut live = self
            .live_workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *live = live.saturating_sub(1);
        self.worker_exited.notify_all();
    }

    /// Blocks until at most `remaining` workers are alive.
    pub(crate) fn wait_for_exit(&self, remaining: usize) {
        let mut live = self
            .live_workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *live > remaining {
            live = self
                .worker_exited
                .wait(live)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns `true` when called from one of this pool's worker threads.
    pub(crate) fn is_current_worker(&self) -> bool {
        CURRENT_POOL.with(|pool| ptr::eq(pool.get(), self))
    }
}

/// One worker thread's view of the pool.
///
/// Dropping a `Worker` while its thread unwinds spawns a replacement, so
/// the pool keeps its size even if the worker loop itself panics.
pub(crate) struct Worker<R: Send + 'static> {
    id: usize,
    jobs: Receiver<Job<R>>,
    results: Sender<Completion<R>>,
    shared: Arc<Shared>,
}

impl<R: Send + 'static> Worker<R> {
    /// Spawns a worker thread and registers its handle with the pool.
    pub(crate) fn spawn(
        id: usize,
        jobs: Receiver<Job<R>>,
        results: Sender<Completion<R>>,
        shared: Arc<Shared>,
    ) -> Result<()> {
        let name = format!("{}-{id}", shared.thread_name);
        shared.worker_started();
        let worker = Worker {
            id,
            jobs,
            results,
            shared: Arc::clone(&shared),
        };
        // On failure the closure, and the worker in it, is dropped, which
        // undoes the live count above.
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker.run())?;
        shared
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        Ok(())
    }

    fn run(&self) {
        CURRENT_POOL.with(|pool| pool.set(Arc::as_ptr(&self.shared)));
        debug!("Worker {} started", self.id);
        for job in self.jobs.iter() {
            self.execute(job);
        }
        debug!("Worker {}: queue closed and drained, shutting down", self.id);
    }

    fn execute(&self, job: Job<R>) {
        match job {
            Job::Task { id, run } => {
                debug!("Worker {} executing task {id}", self.id);
                let outcome = match panic::catch_unwind(AssertUnwindSafe(run)) {
                    Ok(outcome) => outcome,
                    Err(payload) => {
                        let message = panic_message(&*payload);
                        discard_payload(payload);
                        Err(TaskError::Panicked(message))
                    }
                };
                if let Err(e) = &outcome {
                    warn!("Worker {}: task {id}: {e}", self.id);
                    self.shared.failed.fetch_add(1, Ordering::SeqCst);
                }
                self.shared.completed.fetch_add(1, Ordering::SeqCst);
                if self.results.send(Completion { id, outcome }).is_err() {
                    debug!("Worker {}: result channel closed, dropping result of {id}", self.id);
                }
            }
            Job::Detached(job) => {
                debug!("Worker {} executing job", self.id);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    error!("Worker {} job panicked, continuing", self.id);
                    self.shared.failed.fetch_add(1, Ordering::SeqCst);
                    discard_payload(payload);
                }
                self.shared.completed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

impl<R: Send + 'static> Drop for Worker<R> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Worker {} died unexpectedly, spawning a replacement", self.id);
            if let Err(e) = Worker::spawn(
                self.id,
                self.jobs.clone(),
                self.results.clone(),
                Arc::clone(&self.shared),
            ) {
                error!(
                    "Failed to replace worker {}: {}; pool capacity is degraded",
                    self.id, e
                );
            }
        }
        self.shared.worker_exited();
    }
}
