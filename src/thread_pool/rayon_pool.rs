use log::error;

use super::ThreadPool;
use crate::{PoolError, Result};

/// A thread pool backed by the `rayon` library.
///
/// Uses rayon's work-stealing scheduler. It has no lifecycle or result
/// channel and serves as a baseline to measure `WorkerPool` against.
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl RayonThreadPool {
    /// Number of threads in the underlying rayon pool.
    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(PoolError::InvalidSize);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|id| format!("rayon-worker-{id}"))
            .panic_handler(|_| error!("Rayon job panicked, continuing"))
            .build()?;
        Ok(RayonThreadPool { pool })
    }

    fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
        Ok(())
    }
}
