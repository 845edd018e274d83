use crate::Result;

/// A thread pool for executing fire-and-forget jobs concurrently.
///
/// Implementors manage a pool of worker threads and distribute
/// incoming jobs across them.
pub trait ThreadPool {
    /// Creates a new thread pool with the given number of threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created (e.g., zero threads).
    fn new(threads: usize) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a function into the thread pool.
    ///
    /// The function will be executed by one of the threads in the pool.
    /// A panic inside `job` is contained; the pool keeps its threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool no longer accepts jobs.
    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static;
}

mod rayon_pool;
mod results;
mod worker;
mod worker_pool;

pub use self::rayon_pool::RayonThreadPool;
pub use self::results::ResultReceiver;
pub use self::worker_pool::{PoolBuilder, PoolState, PoolStats, WorkerPool};
