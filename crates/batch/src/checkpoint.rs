//! Deferred-checkpoint backends.
//!
//! A [`Checkpoint`] is the host's "run soon" tier: callbacks handed to it run
//! after the current synchronous work has unwound and before any
//! coarser-grained work (timers, I/O) the host has queued.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Callback deferred to the next checkpoint.
pub type Deferred = Box<dyn FnOnce()>;

/// Host capability for running a callback at the next checkpoint.
///
/// Implementations must never run the callback synchronously inside `defer`.
pub trait Checkpoint {
    fn defer(&self, callback: Deferred);
}

impl<C: Checkpoint + ?Sized> Checkpoint for Rc<C> {
    fn defer(&self, callback: Deferred) {
        (**self).defer(callback)
    }
}

// ── In-process microtask tier ─────────────────────────────────

/// FIFO microtask tier driven by the host loop.
///
/// The host calls [`run_until_idle`](Self::run_until_idle) once its current
/// synchronous turn is done. Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    callbacks: Rc<RefCell<VecDeque<Deferred>>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run callbacks until the queue is empty, including callbacks deferred
    /// while draining. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow ends before the callback runs so it may defer more.
            let next = self.callbacks.borrow_mut().pop_front();
            match next {
                Some(callback) => {
                    callback();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Number of callbacks waiting for the next checkpoint.
    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }
}

impl Checkpoint for MicrotaskQueue {
    fn defer(&self, callback: Deferred) {
        self.callbacks.borrow_mut().push_back(callback);
    }
}

// ── Tokio ─────────────────────────────────────────────────────

/// Checkpoint backed by `tokio::task::spawn_local`.
///
/// Must be used from inside a [`tokio::task::LocalSet`]; `defer` panics
/// otherwise, the same way `spawn_local` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCheckpoint;

impl Checkpoint for TokioCheckpoint {
    fn defer(&self, callback: Deferred) {
        tokio::task::spawn_local(async move { callback() });
    }
}
