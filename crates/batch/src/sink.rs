//! Diagnostic sinks for task failures.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use nexttick_core::{TaskError, TaskRef};

/// Receives one record per failed task.
///
/// A sink only observes; it has no way to influence the flush. If `report`
/// panics the scheduler catches it and logs through its fallback path.
pub trait DiagnosticSink {
    fn report(&self, task: &TaskRef, error: &TaskError);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Rc<S> {
    fn report(&self, task: &TaskRef, error: &TaskError) {
        (**self).report(task, error)
    }
}

/// Default sink: one `warn` event per failure.
#[derive(Debug, Clone)]
pub struct TracingSink {
    domain: String,
}

impl TracingSink {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

impl DiagnosticSink for TracingSink {
    fn report(&self, task: &TaskRef, error: &TaskError) {
        tracing::warn!(
            domain = %self.domain,
            task_id = %task.id,
            seq = task.seq,
            label = task.label.as_deref().unwrap_or(""),
            error = %error,
            "An error occurred while running a deferred task"
        );
    }
}

/// A captured failure.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub task: TaskRef,
    /// Rendered error; `TaskError` itself is not `Clone`.
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Sink that keeps every record in memory.
///
/// Clones share the same storage, so a test can keep one handle and give the
/// other to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Rc<RefCell<Vec<FailureRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FailureRecord> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, task: &TaskRef, error: &TaskError) {
        self.records.borrow_mut().push(FailureRecord {
            task: task.clone(),
            error: error.to_string(),
            at: Utc::now(),
        });
    }
}
