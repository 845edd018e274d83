use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Default prefix for worker thread names.
pub const DEFAULT_THREAD_NAME: &str = "pool-worker";

/// What a submitter experiences when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullPolicy {
    /// Block the submitter until a worker frees a slot.
    Block,
    /// Fail the submission with `PoolError::QueueFull`.
    Reject,
}

/// Capacity of the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueMode {
    /// No limit on pending jobs; `submit` never blocks.
    #[default]
    Unbounded,
    /// At most `capacity` pending jobs.
    Bounded {
        /// Maximum number of queued jobs.
        capacity: usize,
        /// Behavior once `capacity` jobs are queued.
        on_full: FullPolicy,
    },
}

/// Configuration of a `WorkerPool`.
///
/// Can be loaded from JSON; missing fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub size: usize,
    /// Job queue capacity.
    pub queue: QueueMode,
    /// Prefix of worker thread names; workers are named `{prefix}-{id}`.
    pub thread_name: String,
}

impl PoolConfig {
    /// Creates a config with `size` workers and default settings otherwise.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Reads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: num_cpus::get(),
            queue: QueueMode::Unbounded,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}
