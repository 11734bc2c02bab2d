//! Deferred tasks and the references handed out for them.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// Unique task identifier.
pub type TaskId = Uuid;

type TaskFn = Box<dyn FnOnce() -> Result<(), TaskError>>;

/// Identity of a submitted task.
///
/// The closure itself is consumed when it runs, so diagnostics carry this
/// reference instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: TaskId,
    /// Submission sequence number within the owning scheduler, starting at 0.
    pub seq: u64,
    pub label: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "task #{} '{}' ({})", self.seq, label, self.id),
            None => write!(f, "task #{} ({})", self.seq, self.id),
        }
    }
}

/// An opaque, zero-argument unit of work.
pub struct Task {
    reference: TaskRef,
    run: TaskFn,
}

impl Task {
    /// Wrap an infallible closure.
    pub fn new<F>(seq: u64, label: Option<String>, f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self::from_fn(seq, label, Box::new(move || {
            f();
            Ok(())
        }))
    }

    /// Wrap a closure whose `Err` counts as a task failure.
    pub fn fallible<F>(seq: u64, label: Option<String>, f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        Self::from_fn(seq, label, Box::new(move || f().map_err(TaskError::from)))
    }

    fn from_fn(seq: u64, label: Option<String>, run: TaskFn) -> Self {
        Self {
            reference: TaskRef {
                id: Uuid::new_v4(),
                seq,
                label,
                submitted_at: Utc::now(),
            },
            run,
        }
    }

    pub fn reference(&self) -> &TaskRef {
        &self.reference
    }

    /// Run the task, converting a panic into [`TaskError::Panicked`].
    ///
    /// Returns the task's reference alongside the outcome.
    pub fn run(self) -> (TaskRef, Result<(), TaskError>) {
        let Task { reference, run } = self;
        let outcome = match panic::catch_unwind(AssertUnwindSafe(run)) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::from_panic(payload)),
        };
        (reference, outcome)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}
