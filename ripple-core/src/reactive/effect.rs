//! Computation Implementation
//!
//! A Computation (an effect) is a unit of reactive work that re-runs
//! whenever a location it read during its last run changes.
//!
//! # How Computations Work
//!
//! 1. When created, the computation runs its body immediately to establish
//!    its dependencies, unless it was created lazily.
//!
//! 2. Before every run it unsubscribes from everything it depended on, then
//!    runs the body with itself active on the store's context stack. Only
//!    the locations read during this run are dependencies afterwards, so a
//!    branch that is no longer taken stops causing re-runs.
//!
//! 3. When a dependency changes, the store notifies the computation. With a
//!    scheduler, the scheduler decides what happens (mark dirty, enqueue,
//!    ...). Without one, the computation re-runs synchronously.
//!
//! 4. A body cannot be re-entered. If a computation is notified while its
//!    body is still executing further down the stack (a nested computation
//!    wrote something it had read), the re-run is deferred: it happens as
//!    soon as the current run returns. Deferred re-runs are bounded by the
//!    store's `max_trigger_depth`.
//!
//! # Stopping
//!
//! [`Computation::stop`] unsubscribes the computation permanently. A stopped
//! computation can still be run by hand; its body then executes without any
//! tracking. Dropping the last handle of a computation stops it as well.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::debug;

use super::store::Store;
use super::subscriber::{ComputationId, Dep, Subscriber};
use crate::error::{ReactiveError, Result};

/// A re-run strategy, invoked instead of a synchronous re-run when a
/// dependency changes.
pub type Scheduler<T> = Rc<dyn Fn(&Computation<T>) -> Result<()>>;

type Body<T> = Box<dyn FnMut() -> Result<T>>;

/// Options for [`Computation::new`].
pub struct RunOptions<T> {
    /// Skip the initial run. The computation tracks nothing until it is run
    /// by hand.
    pub lazy: bool,

    pub scheduler: Option<Scheduler<T>>,
}

impl<T> RunOptions<T> {
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            scheduler: None,
        }
    }

    pub fn with_scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&Computation<T>) -> Result<()> + 'static,
    {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    /// Use an already shared scheduler, such as [`JobQueue::scheduler`].
    ///
    /// [`JobQueue::scheduler`]: super::JobQueue::scheduler
    pub fn with_scheduler_rc(mut self, scheduler: Scheduler<T>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

impl<T> Default for RunOptions<T> {
    fn default() -> Self {
        Self {
            lazy: false,
            scheduler: None,
        }
    }
}

/// Register a computation on `store` and, unless `options.lazy`, run it.
///
/// Same as [`Store::run_tracked`].
pub fn run_tracked<T, F>(store: &Store, body: F, options: RunOptions<T>) -> Result<Computation<T>>
where
    T: 'static,
    F: FnMut() -> Result<T> + 'static,
{
    Computation::new(store, body, options)
}

pub(crate) struct ComputationInner<T> {
    id: ComputationId,
    store: Store,
    body: RefCell<Body<T>>,
    scheduler: Option<Scheduler<T>>,

    /// Dependency sets this computation currently belongs to.
    deps: RefCell<SmallVec<[Rc<Dep>; 4]>>,

    active: Cell<bool>,
    rerun: Cell<bool>,
    run_count: Cell<usize>,
}

/// A tracked unit of reactive work.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::{RawContainer, RunOptions, Store};
///
/// let store = Store::new();
/// let state = store.wrap_container(&RawContainer::from_entries([("count", 0)]));
///
/// let seen = Rc::new(Cell::new(-1.0));
/// let reader = state.clone();
/// let sink = Rc::clone(&seen);
/// let _effect = store
///     .run_tracked(
///         move || {
///             sink.set(reader.get_f64("count").unwrap_or_default());
///             Ok(())
///         },
///         RunOptions::default(),
///     )
///     .unwrap();
///
/// state.set("count", 1).unwrap();
/// assert_eq!(seen.get(), 1.0);
/// ```
pub struct Computation<T> {
    inner: Rc<ComputationInner<T>>,
}

impl<T: 'static> Computation<T> {
    /// Create a computation and, unless `options.lazy`, run it once.
    ///
    /// An error from the initial run is returned and the computation is
    /// discarded.
    pub fn new<F>(store: &Store, body: F, options: RunOptions<T>) -> Result<Self>
    where
        F: FnMut() -> Result<T> + 'static,
    {
        let computation = Self::build(store, Box::new(body), options.scheduler);
        if !options.lazy {
            computation.run()?;
        }
        Ok(computation)
    }

    pub(crate) fn build(store: &Store, body: Body<T>, scheduler: Option<Scheduler<T>>) -> Self {
        Self {
            inner: Rc::new(ComputationInner {
                id: ComputationId::new(),
                store: store.clone(),
                body: RefCell::new(body),
                scheduler,
                deps: RefCell::new(SmallVec::new()),
                active: Cell::new(true),
                rerun: Cell::new(false),
                run_count: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// Run the body now, re-collecting dependencies, and return its result.
    ///
    /// Calling this from inside the body itself fails with
    /// [`ReactiveError::AlreadyRunning`]. If the computation was notified
    /// while its body ran, the body runs again before this returns; more
    /// than `max_trigger_depth` such re-runs fail with
    /// [`ReactiveError::TriggerDepthExceeded`].
    pub fn run(&self) -> Result<T> {
        let inner = &self.inner;
        let mut body = inner
            .body
            .try_borrow_mut()
            .map_err(|_| ReactiveError::AlreadyRunning(inner.id))?;

        let body = &mut **body;

        if !inner.active.get() {
            return body();
        }

        let limit = inner.store.config().max_trigger_depth;
        let mut reruns = 0;
        loop {
            inner.cleanup();
            let result = {
                let _ctx = inner.store.context().enter(self.as_subscriber());
                inner.run_count.set(inner.run_count.get() + 1);
                body()
            };

            if !inner.rerun.replace(false) || !inner.active.get() || result.is_err() {
                return result;
            }
            if reruns >= limit {
                return Err(ReactiveError::TriggerDepthExceeded { limit });
            }
            reruns += 1;
            debug!(computation = %inner.id, reruns, "re-running after a nested write");
        }
    }

    /// Whether the body is executing right now.
    pub(crate) fn is_running(&self) -> bool {
        self.inner.body.try_borrow().is_err()
    }

    /// Unsubscribe permanently. Idempotent.
    pub fn stop(&self) {
        self.inner.stop_inner();
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of dependency sets this computation currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub(crate) fn as_subscriber(&self) -> Rc<dyn Subscriber> {
        Rc::clone(&self.inner) as Rc<dyn Subscriber>
    }
}

impl<T> ComputationInner<T> {
    /// Leave every dependency set and forget them.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps {
            dep.remove(self.id);
            self.store.prune(&dep);
        }
    }

    fn stop_inner(&self) {
        if self.active.replace(false) {
            self.cleanup();
            debug!(computation = %self.id, "stopped");
        }
    }
}

impl<T: 'static> Subscriber for ComputationInner<T> {
    fn id(&self) -> ComputationId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn link(&self, dep: &Rc<Dep>) {
        self.deps.borrow_mut().push(Rc::clone(dep));
    }

    fn notify(self: Rc<Self>) -> Result<()> {
        if !self.active.get() {
            return Ok(());
        }
        let computation = Computation { inner: self };
        match &computation.inner.scheduler {
            Some(scheduler) => scheduler(&computation),
            None if computation.is_running() => {
                computation.inner.rerun.set(true);
                Ok(())
            }
            None => computation.run().map(drop),
        }
    }

    fn execute(self: Rc<Self>) -> Result<()> {
        Computation { inner: self }.run().map(drop)
    }

    fn stop(&self) {
        self.stop_inner();
    }
}

impl<T> Drop for ComputationInner<T> {
    fn drop(&mut self) {
        if self.active.get() {
            self.cleanup();
        }
    }
}

impl<T> Clone for Computation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Computation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
