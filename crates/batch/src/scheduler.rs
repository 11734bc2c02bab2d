//! The batch scheduler.
//!
//! Every task submitted during one synchronous turn joins the same batch, and
//! the batch is drained once, at the next checkpoint. Only the first
//! submission of a batch arranges a flush; later ones just append.
//!
//! ```text
//! Closed ──submit──▶ Open ──checkpoint──▶ Draining ──done──▶ Closed
//!                                            │
//!                                            └──(requeued tail)──▶ Open
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, error, warn};

use nexttick_core::config::load_dotenv;
use nexttick_core::{
    panic_message, NextTickError, ReentryPolicy, SchedulerConfig, Task, TaskError, TaskRef,
};

use crate::checkpoint::Checkpoint;
use crate::sink::{DiagnosticSink, TracingSink};
use crate::stats::BatchStats;

/// Where the current batch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPhase {
    /// No flush arranged; the next submission opens a batch.
    Closed,
    /// A flush is arranged and has not started draining.
    Open,
    /// A flush is running tasks.
    Draining,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPhase::Closed => write!(f, "closed"),
            BatchPhase::Open => write!(f, "open"),
            BatchPhase::Draining => write!(f, "draining"),
        }
    }
}

struct BatchState {
    queue: VecDeque<Task>,
    phase: BatchPhase,
    next_seq: u64,
    stats: BatchStats,
}

struct Inner {
    config: SchedulerConfig,
    checkpoint: Box<dyn Checkpoint>,
    sink: Box<dyn DiagnosticSink>,
    state: RefCell<BatchState>,
}

/// Handle to one batching domain.
///
/// Clones share the same queue. The scheduler is single-threaded (`!Send`);
/// tasks may submit to it while it is draining.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Rc<Inner>,
}

impl BatchScheduler {
    /// Scheduler with the default config, reporting failures through
    /// [`TracingSink`].
    pub fn new(checkpoint: impl Checkpoint + 'static) -> Self {
        let config = SchedulerConfig::default();
        let sink = TracingSink::new(config.domain.clone());
        Self::from_parts(config, Box::new(checkpoint), Box::new(sink))
    }

    pub fn builder() -> BatchSchedulerBuilder {
        BatchSchedulerBuilder::default()
    }

    fn from_parts(
        config: SchedulerConfig,
        checkpoint: Box<dyn Checkpoint>,
        sink: Box<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                checkpoint,
                sink,
                state: RefCell::new(BatchState {
                    queue: VecDeque::new(),
                    phase: BatchPhase::Closed,
                    next_seq: 0,
                    stats: BatchStats::default(),
                }),
            }),
        }
    }

    // ── Submission ────────────────────────────────────────────

    /// Queue `task` for the next flush.
    ///
    /// Never fails and never runs the task synchronously. The returned
    /// reference is the one a diagnostic sink will see if the task fails.
    pub fn submit<F>(&self, task: F) -> TaskRef
    where
        F: FnOnce() + 'static,
    {
        self.enqueue(|seq| Task::new(seq, None, task))
    }

    pub fn submit_labeled<F>(&self, label: impl Into<String>, task: F) -> TaskRef
    where
        F: FnOnce() + 'static,
    {
        let label = label.into();
        self.enqueue(|seq| Task::new(seq, Some(label), task))
    }

    /// Queue a task whose `Err` is reported like a panic.
    pub fn submit_fallible<F>(&self, task: F) -> TaskRef
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.enqueue(|seq| Task::fallible(seq, None, task))
    }

    pub fn submit_fallible_labeled<F>(&self, label: impl Into<String>, task: F) -> TaskRef
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        let label = label.into();
        self.enqueue(|seq| Task::fallible(seq, Some(label), task))
    }

    fn enqueue(&self, make: impl FnOnce(u64) -> Task) -> TaskRef {
        let (reference, opened) = {
            let mut state = self.inner.state.borrow_mut();
            let seq = state.next_seq;
            state.next_seq += 1;

            let task = make(seq);
            let reference = task.reference().clone();
            state.queue.push_back(task);

            let opened = state.phase == BatchPhase::Closed;
            if opened {
                state.phase = BatchPhase::Open;
                state.stats.flushes_scheduled += 1;
            }
            (reference, opened)
        };

        if opened {
            debug!(domain = %self.inner.config.domain, first_seq = reference.seq, "Batch opened");
            self.arm();
        }
        reference
    }

    /// Hand one flush callback to the checkpoint.
    ///
    /// The callback holds a strong handle so queued tasks still run if every
    /// other handle is dropped first.
    fn arm(&self) {
        let scheduler = self.clone();
        self.inner.checkpoint.defer(Box::new(move || scheduler.flush()));
    }

    // ── Draining ──────────────────────────────────────────────

    fn flush(&self) {
        let batch_len = {
            let mut state = self.inner.state.borrow_mut();
            if state.phase != BatchPhase::Open {
                debug!(
                    domain = %self.inner.config.domain,
                    phase = %state.phase,
                    "Ignoring stale flush callback"
                );
                return;
            }
            state.phase = BatchPhase::Draining;
            state.queue.len()
        };

        let mut failed = 0u64;
        for _ in 0..batch_len {
            // No borrow may be held while a task runs: tasks can submit.
            let next = self.inner.state.borrow_mut().queue.pop_front();
            let Some(task) = next else { break };

            let (reference, outcome) = task.run();
            if let Err(err) = outcome {
                failed += 1;
                self.report(&reference, &err);
            }
        }

        let (rearm, discarded) = {
            let mut state = self.inner.state.borrow_mut();
            state.stats.batches_flushed += 1;
            state.stats.tasks_run += batch_len as u64;
            state.stats.tasks_failed += failed;

            if state.queue.is_empty() {
                state.phase = BatchPhase::Closed;
                (false, VecDeque::new())
            } else {
                match self.inner.config.reentry {
                    ReentryPolicy::Requeue => {
                        state.phase = BatchPhase::Open;
                        state.stats.flushes_scheduled += 1;
                        (true, VecDeque::new())
                    }
                    ReentryPolicy::Discard => {
                        let tail = std::mem::take(&mut state.queue);
                        state.stats.tasks_discarded += tail.len() as u64;
                        state.phase = BatchPhase::Closed;
                        (false, tail)
                    }
                }
            }
        };

        debug!(
            domain = %self.inner.config.domain,
            tasks = batch_len,
            failed,
            requeued = rearm,
            "Batch flushed"
        );

        if !discarded.is_empty() {
            warn!(
                domain = %self.inner.config.domain,
                count = discarded.len(),
                "Discarding tasks submitted during flush"
            );
        }
        // Dropped outside the borrow; a closure's captures may touch the scheduler.
        drop(discarded);

        if rearm {
            self.arm();
        }
    }

    fn report(&self, reference: &TaskRef, err: &TaskError) {
        let sink = &self.inner.sink;
        let reported = panic::catch_unwind(AssertUnwindSafe(|| sink.report(reference, err)));
        if let Err(payload) = reported {
            error!(
                domain = %self.inner.config.domain,
                task_id = %reference.id,
                seq = reference.seq,
                task_error = %err,
                sink_error = %panic_message(payload.as_ref()),
                "Diagnostic sink panicked while reporting a task failure"
            );
        }
    }

    // ── Introspection ─────────────────────────────────────────

    /// Tasks queued and not yet attempted.
    pub fn pending(&self) -> usize {
        self.inner.state.borrow().queue.len()
    }

    pub fn phase(&self) -> BatchPhase {
        self.inner.state.borrow().phase
    }

    /// True while a flush is arranged and has not begun draining.
    pub fn is_batch_open(&self) -> bool {
        self.phase() == BatchPhase::Open
    }

    pub fn stats(&self) -> BatchStats {
        self.inner.state.borrow().stats
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }
}

impl fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("BatchScheduler")
            .field("domain", &self.inner.config.domain)
            .field("phase", &state.phase)
            .field("pending", &state.queue.len())
            .field("stats", &state.stats)
            .finish()
    }
}

// ── Builder ───────────────────────────────────────────────────

#[derive(Default)]
pub struct BatchSchedulerBuilder {
    config: SchedulerConfig,
    checkpoint: Option<Box<dyn Checkpoint>>,
    sink: Option<Box<dyn DiagnosticSink>>,
}

impl BatchSchedulerBuilder {
    /// Builder seeded from `.env` and the `NEXTTICK_*` environment variables.
    pub fn from_env() -> Self {
        load_dotenv();
        let config = SchedulerConfig::from_env();
        config.log_summary();
        Self::default().config(config)
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reentry(mut self, reentry: ReentryPolicy) -> Self {
        self.config.reentry = reentry;
        self
    }

    pub fn checkpoint(mut self, checkpoint: impl Checkpoint + 'static) -> Self {
        self.checkpoint = Some(Box::new(checkpoint));
        self
    }

    /// Defaults to a [`TracingSink`] named after the domain.
    pub fn sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn build(self) -> Result<BatchScheduler, NextTickError> {
        self.config.validate()?;
        let checkpoint = self
            .checkpoint
            .ok_or_else(|| NextTickError::Config("no checkpoint configured".into()))?;
        let sink: Box<dyn DiagnosticSink> = match self.sink {
            Some(sink) => sink,
            None => Box::new(TracingSink::new(self.config.domain.clone())),
        };
        Ok(BatchScheduler::from_parts(self.config, checkpoint, sink))
    }
}
