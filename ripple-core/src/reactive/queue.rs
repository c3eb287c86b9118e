//! Job Queue
//!
//! A job queue batches re-runs. Computations created with
//! [`JobQueue::scheduler`] do not re-run when a dependency changes; they are
//! enqueued instead, and run when the queue is flushed.
//!
//! # Algorithm
//!
//! 1. On trigger, a computation is appended to the queue unless it is
//!    already waiting. However many writes happen before the flush, it runs
//!    once.
//! 2. [`JobQueue::flush`] pops jobs in FIFO order. A job is marked as no
//!    longer queued before it runs, so a write made by one job can enqueue
//!    it (or any other computation) again within the same flush.
//! 3. Jobs whose computation was dropped or stopped while waiting are
//!    skipped.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::effect::{Computation, Scheduler};
use super::subscriber::{ComputationId, Subscriber};
use crate::error::Result;

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<(ComputationId, Weak<dyn Subscriber>)>,
    queued: HashSet<ComputationId>,
}

/// A FIFO queue of pending computation re-runs.
///
/// Cloning the handle is cheap; clones share the queue.
#[derive(Clone, Default)]
pub struct JobQueue {
    state: Rc<RefCell<QueueState>>,
    flushing: Rc<Cell<bool>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler that enqueues the triggered computation on this queue.
    ///
    /// ```rust
    /// use ripple_core::reactive::JobQueue;
    /// use ripple_core::{RunOptions, Store};
    ///
    /// let store = Store::new();
    /// let queue = JobQueue::new();
    /// let count = store.new_ref(0);
    ///
    /// let reader = count.clone();
    /// let effect = store
    ///     .run_tracked(
    ///         move || Ok(reader.get()),
    ///         RunOptions::default().with_scheduler_rc(queue.scheduler()),
    ///     )
    ///     .unwrap();
    ///
    /// count.set(1).unwrap();
    /// count.set(2).unwrap();
    /// assert_eq!(effect.run_count(), 1);
    ///
    /// assert_eq!(queue.flush().unwrap(), 1);
    /// assert_eq!(effect.run_count(), 2);
    /// ```
    pub fn scheduler<T: 'static>(&self) -> Scheduler<T> {
        let queue = self.clone();
        Rc::new(move |computation: &Computation<T>| {
            queue.enqueue(computation.as_subscriber());
            Ok(())
        })
    }

    /// Append `job` unless it is already waiting. Returns whether it was
    /// appended.
    pub(crate) fn enqueue(&self, job: Rc<dyn Subscriber>) -> bool {
        let mut state = self.state.borrow_mut();
        let id = job.id();
        if !state.queued.insert(id) {
            trace!(computation = %id, "already queued");
            return false;
        }
        state.jobs.push_back((id, Rc::downgrade(&job)));
        trace!(computation = %id, pending = state.jobs.len(), "queued");
        true
    }

    /// Run queued jobs until the queue is empty. Returns how many ran.
    ///
    /// The first failing job stops the flush and its error is returned; the
    /// jobs behind it stay queued. Calling `flush` from inside a job is a
    /// no-op: the outer flush picks up whatever the job enqueued.
    pub fn flush(&self) -> Result<usize> {
        if self.flushing.replace(true) {
            return Ok(0);
        }
        let _flushing = FlushGuard(&self.flushing);

        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let next = state.jobs.pop_front();
                if let Some((id, _)) = &next {
                    state.queued.remove(id);
                }
                next
            };
            let Some((id, job)) = next else {
                break;
            };

            let Some(job) = job.upgrade().filter(|job| job.is_active()) else {
                trace!(computation = %id, "skipping dead job");
                continue;
            };

            job.execute()?;
            ran += 1;
        }

        debug!(ran, "flushed job queue");
        Ok(ran)
    }

    /// Number of jobs waiting.
    pub fn len(&self) -> usize {
        self.state.borrow().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().jobs.is_empty()
    }

    /// Drop every waiting job without running it.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.jobs.clear();
        state.queued.clear();
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.len())
            .field("flushing", &self.flushing.get())
            .finish()
    }
}

struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
