use std::fmt;

use serde::Serialize;

/// Lifetime counters of one scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Deferred flush callbacks handed to the checkpoint.
    pub flushes_scheduled: u64,
    /// Flushes that drained a batch.
    pub batches_flushed: u64,
    /// Tasks attempted, successful or not.
    pub tasks_run: u64,
    pub tasks_failed: u64,
    /// Tasks cleared without running under `ReentryPolicy::Discard`.
    pub tasks_discarded: u64,
}

impl BatchStats {
    pub fn tasks_succeeded(&self) -> u64 {
        self.tasks_run - self.tasks_failed
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BatchStats {{ scheduled: {}, flushed: {}, run: {}, failed: {}, discarded: {} }}",
            self.flushes_scheduled,
            self.batches_flushed,
            self.tasks_run,
            self.tasks_failed,
            self.tasks_discarded
        )
    }
}
