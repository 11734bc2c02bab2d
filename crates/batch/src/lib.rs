//! Deferred-task batching.
//!
//! Tasks submitted during one synchronous turn are coalesced into a single
//! batch and run together, in order, at the next checkpoint of the host
//! loop. A failing task is reported to a [`DiagnosticSink`] and never stops
//! the rest of its batch.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use nexttick_batch::{BatchScheduler, MicrotaskQueue};
//!
//! let microtasks = MicrotaskQueue::new();
//! let scheduler = BatchScheduler::new(microtasks.clone());
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! for i in 0..3 {
//!     let log = log.clone();
//!     scheduler.submit(move || log.borrow_mut().push(i));
//! }
//! assert!(log.borrow().is_empty());
//!
//! // End of the synchronous turn: one flush runs all three tasks.
//! assert_eq!(microtasks.run_until_idle(), 1);
//! assert_eq!(*log.borrow(), vec![0, 1, 2]);
//! ```

pub mod checkpoint;
pub mod scheduler;
pub mod sink;
pub mod stats;

pub use checkpoint::{Checkpoint, Deferred, MicrotaskQueue, TokioCheckpoint};
pub use nexttick_core::{NextTickError, ReentryPolicy, SchedulerConfig, TaskError, TaskRef};
pub use scheduler::{BatchPhase, BatchScheduler, BatchSchedulerBuilder};
pub use sink::{DiagnosticSink, FailureRecord, RecordingSink, TracingSink};
pub use stats::BatchStats;
