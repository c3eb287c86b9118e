//! Watchers
//!
//! A watcher runs a callback with the new and previous value of a source
//! every time the source's dependencies are triggered.
//!
//! The source is evaluated by a lazy computation whose scheduler is the
//! watcher's job: on trigger the job re-evaluates the source, hands both
//! values to the callback and remembers the new value for next time. The
//! callback is not compared against the old value first, so it also fires
//! when a write produced an equal result.
//!
//! A trigger that arrives while the callback is running (for instance the
//! callback writing its own source) is not lost: the job runs again right
//! after the callback returns, with the value the callback just saw as the
//! old value. Such follow-up runs are bounded by the store's
//! `max_trigger_depth`.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::computed::Computed;
use super::effect::{Computation, Scheduler};
use super::observed::Observed;
use super::ref_cell::Ref;
use super::store::Store;
use super::subscriber::{ComputationId, Subscriber};
use crate::error::{ReactiveError, Result};
use crate::value::{SameValue, TargetId};

type Getter<T> = Box<dyn FnMut() -> Result<T>>;
type Callback<T> = Box<dyn FnMut(&T, Option<&T>) -> Result<()>>;

/// Something a watcher can observe.
///
/// Implemented for getter closures, refs, computed values and [`Deep`].
pub trait WatchSource<T> {
    fn into_getter(self) -> Getter<T>;
}

impl<T, F> WatchSource<T> for F
where
    T: 'static,
    F: FnMut() -> Result<T> + 'static,
{
    fn into_getter(self) -> Getter<T> {
        Box::new(self)
    }
}

impl<T> WatchSource<T> for Ref<T>
where
    T: Clone + SameValue + 'static,
{
    fn into_getter(self) -> Getter<T> {
        Box::new(move || Ok(self.get()))
    }
}

impl<T> WatchSource<T> for Computed<T>
where
    T: Clone + 'static,
{
    fn into_getter(self) -> Getter<T> {
        Box::new(move || self.value())
    }
}

/// Watch every location reachable from a container.
///
/// The callback receives the container itself as both the new and the old
/// value.
#[derive(Debug, Clone)]
pub struct Deep(pub Observed);

impl WatchSource<Observed> for Deep {
    fn into_getter(self) -> Getter<Observed> {
        let Deep(observed) = self;
        Box::new(move || {
            traverse(&observed);
            Ok(observed.clone())
        })
    }
}

/// Read every key of `observed` and of every container reachable from it,
/// so the active computation depends on all of them.
///
/// Each container is visited once, which makes cyclic structures safe.
pub fn traverse(observed: &Observed) {
    let mut seen = HashSet::new();
    visit(observed, &mut seen);
}

fn visit(observed: &Observed, seen: &mut HashSet<TargetId>) {
    if !seen.insert(observed.id()) {
        return;
    }
    for key in observed.keys() {
        if let Some(child) = observed.get_container(key) {
            visit(&child, seen);
        }
    }
}

/// Options for [`watch`].
///
/// Whatever the options, a callback that writes its own source is called
/// again for that write once it returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Invoke the callback once right away, with no old value.
    pub immediate: bool,
}

impl WatchOptions {
    pub fn immediate() -> Self {
        Self { immediate: true }
    }
}

struct WatchState<T> {
    old: RefCell<Option<T>>,
    callback: RefCell<Callback<T>>,

    /// Set when the job is triggered while it cannot run.
    pending: Cell<bool>,
}

impl<T: 'static> WatchState<T> {
    fn job(&self, effect: &Computation<T>) -> Result<()> {
        let mut callback = match self.callback.try_borrow_mut() {
            Ok(callback) if !effect.is_running() => callback,
            _ => {
                debug!(computation = %effect.id(), "watcher busy, change deferred");
                self.pending.set(true);
                return Ok(());
            }
        };

        let limit = effect.store().config().max_trigger_depth;
        let mut reruns = 0;
        loop {
            let value = effect.run()?;
            let old = self.old.borrow_mut().take();
            let result = callback(&value, old.as_ref());
            *self.old.borrow_mut() = Some(value);

            let rerun = self.pending.replace(false);
            result?;
            if !rerun || !effect.is_active() {
                return Ok(());
            }
            if reruns >= limit {
                return Err(ReactiveError::TriggerDepthExceeded { limit });
            }
            reruns += 1;
        }
    }
}

/// Handle to a running watcher. Dropping it stops the watcher.
#[must_use = "dropping a WatchHandle stops the watcher"]
pub struct WatchHandle {
    effect: Rc<dyn Subscriber>,
}

impl WatchHandle {
    pub fn id(&self) -> ComputationId {
        self.effect.id()
    }

    /// Stop watching. Idempotent.
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Invoke `callback(new, old)` whenever `source` is triggered.
///
/// Without [`WatchOptions::immediate`] the source is evaluated once up front
/// to collect dependencies and seed the old value. An error from that first
/// evaluation (or from the immediate callback) is returned.
pub fn watch<T, S, C>(store: &Store, source: S, callback: C, options: WatchOptions) -> Result<WatchHandle>
where
    T: 'static,
    S: WatchSource<T>,
    C: FnMut(&T, Option<&T>) -> Result<()> + 'static,
{
    let state = Rc::new(WatchState {
        old: RefCell::new(None),
        callback: RefCell::new(Box::new(callback) as Callback<T>),
        pending: Cell::new(false),
    });

    let job_state = Rc::clone(&state);
    let scheduler: Scheduler<T> = Rc::new(move |effect: &Computation<T>| job_state.job(effect));
    let effect = Computation::build(store, source.into_getter(), Some(scheduler));

    if options.immediate {
        state.job(&effect)?;
    } else {
        let initial = effect.run()?;
        *state.old.borrow_mut() = Some(initial);
        if state.pending.replace(false) {
            state.job(&effect)?;
        }
    }

    debug!(computation = %effect.id(), immediate = options.immediate, "watching");
    Ok(WatchHandle {
        effect: effect.as_subscriber(),
    })
}
