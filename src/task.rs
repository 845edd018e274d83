use std::any::Any;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Identifier assigned to a task when it is submitted.
///
/// Ids are unique within a pool and increase in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of one task, as delivered on the result channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion<R> {
    /// The id returned by `submit`.
    pub id: TaskId,
    /// The task's value, or why it has none.
    pub outcome: Result<R, TaskError>,
}

impl<R> Completion<R> {
    /// Returns `true` if the task produced a value.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl<R> From<Completion<R>> for (TaskId, Result<R, TaskError>) {
    fn from(completion: Completion<R>) -> Self {
        (completion.id, completion.outcome)
    }
}

pub(crate) type Thunk<R> = Box<dyn FnOnce() -> Result<R, TaskError> + Send + 'static>;

/// A unit of work sitting in the job queue.
pub(crate) enum Job<R> {
    /// A task whose outcome is published on the result channel.
    Task { id: TaskId, run: Thunk<R> },
    /// A fire-and-forget job; only counted in stats.
    Detached(Box<dyn FnOnce() + Send + 'static>),
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Drops a panic payload whose destructor may itself panic.
///
/// A second panic is caught and its payload leaked rather than dropped.
pub(crate) fn discard_payload(payload: Box<dyn Any + Send>) {
    if let Err(nested) = panic::catch_unwind(AssertUnwindSafe(move || drop(payload))) {
        mem::forget(nested);
    }
}
