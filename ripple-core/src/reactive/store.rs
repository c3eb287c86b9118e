//! Dependency Store
//!
//! The store is the central coordinator that connects observed containers,
//! refs, computed values and computations. It owns the dependency table and
//! the active-computation stack.
//!
//! # How It Works
//!
//! 1. A computation runs with itself pushed on the store's context stack.
//!
//! 2. Every read of an observed location calls [`Store::track`], which
//!    records the active computation under `(target, location)` and records
//!    the reverse edge on the computation.
//!
//! 3. Every write that changes a location calls [`Store::trigger`], which
//!    snapshots that location's dependents and notifies each of them, except
//!    computations that are currently running (the self-trigger guard).
//!
//! # Ownership
//!
//! The target table maps a [`TargetId`] to a weak reference to the raw
//! container plus one dependency set per location. The store never keeps a
//! container or a computation alive. Empty dependency sets are pruned as
//! soon as their last subscriber leaves.
//!
//! # Threading
//!
//! A store is single-threaded: `Store` is `!Send` and `!Sync`. Create one
//! store per thread or per reactive scope.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ptr;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use super::computed::Computed;
use super::context::ReactiveContext;
use super::effect::{Computation, RunOptions};
use super::observed::{Observed, ObservedInner, Tracked};
use super::ref_cell::Ref;
use super::subscriber::{ComputationId, Dep, DepOrigin, Subscriber};
use super::watch::{watch, WatchHandle, WatchOptions, WatchSource};
use crate::config::{StoreConfig, TriggerPolicy};
use crate::error::{ReactiveError, Result};
use crate::value::{Key, RawContainer, RawInner, SameValue, TargetId, Value};

/// A trackable location inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Location {
    /// A single property.
    Key(Key),
    /// The length of an array.
    Length,
    /// The set of keys (membership as a whole).
    Keys,
}

struct TargetEntry {
    target: Weak<RawInner>,
    deps: HashMap<Location, Rc<Dep>>,
}

struct StoreInner {
    config: StoreConfig,
    targets: RefCell<HashMap<TargetId, TargetEntry>>,
    observed: RefCell<HashMap<TargetId, Weak<ObservedInner>>>,
    readonly: RefCell<HashMap<TargetId, Weak<ObservedInner>>>,
    context: ReactiveContext,
    trigger_depth: Cell<usize>,
}

/// Handle to a dependency store.
///
/// Cloning the handle is cheap; clones refer to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                config,
                targets: RefCell::new(HashMap::new()),
                observed: RefCell::new(HashMap::new()),
                readonly: RefCell::new(HashMap::new()),
                context: ReactiveContext::default(),
                trigger_depth: Cell::new(0),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Wrapping
    // ------------------------------------------------------------------

    /// Make a value reactive.
    ///
    /// Containers come back as an observed wrapper; every other value is
    /// returned unchanged.
    pub fn wrap(&self, value: impl Into<Value>) -> Tracked {
        match value.into() {
            Value::Container(raw) => Tracked::Container(self.wrap_container(&raw)),
            other => Tracked::Value(other),
        }
    }

    /// Get the observed wrapper of `raw`.
    ///
    /// While a wrapper is alive, wrapping the same raw container again
    /// returns that same wrapper.
    pub fn wrap_container(&self, raw: &RawContainer) -> Observed {
        self.cached_wrapper(raw, false)
    }

    /// Get the read-only wrapper of `raw`. Identity-cached like
    /// [`Store::wrap_container`], separately from the mutable wrapper.
    pub fn readonly(&self, raw: &RawContainer) -> Observed {
        self.cached_wrapper(raw, true)
    }

    fn cached_wrapper(&self, raw: &RawContainer, readonly: bool) -> Observed {
        let cache = if readonly {
            &self.inner.readonly
        } else {
            &self.inner.observed
        };
        let mut cache = cache.borrow_mut();

        if let Some(inner) = cache.get(&raw.id()).and_then(Weak::upgrade) {
            return Observed::from_inner(inner);
        }

        let observed = Observed::new(self.clone(), raw.clone(), readonly);
        cache.insert(raw.id(), observed.downgrade());
        trace!(target_id = %raw.id(), readonly, "wrapped container");
        observed
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// Create a ref holding `value`.
    pub fn new_ref<T>(&self, value: T) -> Ref<T>
    where
        T: Clone + SameValue + 'static,
    {
        Ref::new(self, value)
    }

    /// Register and (unless `options.lazy`) run a tracked computation.
    pub fn run_tracked<T, F>(&self, body: F, options: RunOptions<T>) -> Result<Computation<T>>
    where
        T: 'static,
        F: FnMut() -> Result<T> + 'static,
    {
        Computation::new(self, body, options)
    }

    /// Create a lazily evaluated, cached derived value.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: FnMut() -> Result<T> + 'static,
    {
        Computed::new(self, getter)
    }

    /// Invoke `callback` whenever `source` changes.
    pub fn watch<T, S, C>(&self, source: S, callback: C, options: WatchOptions) -> Result<WatchHandle>
    where
        T: 'static,
        S: WatchSource<T>,
        C: FnMut(&T, Option<&T>) -> Result<()> + 'static,
    {
        watch(self, source, callback, options)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Run `f` with tracking suspended. Reads inside `f` register nothing.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _paused = self.inner.context.pause();
        f()
    }

    /// Whether a computation is collecting dependencies right now.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    /// The id of the computation collecting dependencies right now.
    pub fn active_id(&self) -> Option<ComputationId> {
        self.inner.context.current_id()
    }

    pub(crate) fn context(&self) -> &ReactiveContext {
        &self.inner.context
    }

    /// Record that the active computation reads `location` of `raw`.
    ///
    /// No-op if nothing is active. Idempotent.
    pub(crate) fn track(&self, raw: &RawContainer, location: Location) {
        let Some(active) = self.inner.context.current() else {
            return;
        };

        let dep = {
            let mut targets = self.inner.targets.borrow_mut();
            let entry = targets.entry(raw.id()).or_insert_with(|| TargetEntry {
                target: raw.downgrade(),
                deps: HashMap::new(),
            });
            let dep = entry
                .deps
                .entry(location.clone())
                .or_insert_with(|| Dep::new(DepOrigin::Location(raw.id(), location)));
            Rc::clone(dep)
        };

        self.link(&dep, active);
    }

    /// Record that the active computation depends on an owned dependency
    /// set (a ref's or a computed value's).
    pub(crate) fn track_dep(&self, dep: &Rc<Dep>) {
        if let Some(active) = self.inner.context.current() {
            self.link(dep, active);
        }
    }

    fn link(&self, dep: &Rc<Dep>, active: Rc<dyn Subscriber>) {
        if dep.add(active.id(), Rc::downgrade(&active)) {
            active.link(dep);
            trace!(computation = %active.id(), origin = ?dep.origin(), "tracked");
        }
    }

    // ------------------------------------------------------------------
    // Triggering
    // ------------------------------------------------------------------

    /// Notify the dependents of `location` of `target`.
    pub(crate) fn trigger(&self, target: TargetId, location: &Location) -> Result<()> {
        let dep = {
            let targets = self.inner.targets.borrow();
            targets
                .get(&target)
                .and_then(|entry| entry.deps.get(location))
                .cloned()
        };

        match dep {
            Some(dep) => self.trigger_dep(&dep),
            None => Ok(()),
        }
    }

    /// Notify every subscriber in `dep`.
    ///
    /// The subscriber set is snapshotted first. The active computation is
    /// skipped, so a body writing what it reads does not re-run itself. A
    /// computation further down the stack is notified like any other; it
    /// re-runs once its current run returns.
    pub(crate) fn trigger_dep(&self, dep: &Dep) -> Result<()> {
        let subscribers = dep.snapshot();
        if subscribers.is_empty() {
            self.prune(dep);
            return Ok(());
        }

        let limit = self.inner.config.max_trigger_depth;
        let depth = self.inner.trigger_depth.get();
        if depth >= limit {
            return Err(ReactiveError::TriggerDepthExceeded { limit });
        }
        self.inner.trigger_depth.set(depth + 1);
        let _depth = DepthGuard(&self.inner.trigger_depth);

        debug!(origin = ?dep.origin(), count = subscribers.len(), depth, "triggering dependents");

        let mut first_error = None;
        for subscriber in subscribers {
            let id = subscriber.id();
            if self.inner.context.current_id() == Some(id) {
                debug!(computation = %id, "skipping active computation");
                continue;
            }

            if let Err(err) = subscriber.notify() {
                match self.inner.config.trigger_policy {
                    TriggerPolicy::Abort => return Err(err),
                    TriggerPolicy::Isolate if first_error.is_none() => first_error = Some(err),
                    TriggerPolicy::Isolate => {
                        warn!(computation = %id, error = %err, "dependent failed during trigger");
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Drop `dep` from the target table if it is empty.
    pub(crate) fn prune(&self, dep: &Dep) {
        let DepOrigin::Location(target, location) = dep.origin() else {
            return;
        };
        if !dep.is_empty() {
            return;
        }

        let mut targets = self.inner.targets.borrow_mut();
        let entry_empty = match targets.get_mut(target) {
            Some(entry) => {
                let is_this_dep = entry
                    .deps
                    .get(location)
                    .is_some_and(|stored| ptr::eq(Rc::as_ptr(stored), dep));
                if is_this_dep {
                    entry.deps.remove(location);
                }
                entry.deps.is_empty()
            }
            None => false,
        };

        if entry_empty {
            targets.remove(target);
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Number of computations depending on `key` of `target`.
    pub fn dependent_count(&self, target: &Observed, key: impl Into<Key>) -> usize {
        let key = key.into();
        let Some(key) = target.to_raw().with_data(|data| data.normalize(&key)) else {
            return 0;
        };
        self.inner
            .targets
            .borrow()
            .get(&target.id())
            .and_then(|entry| entry.deps.get(&Location::Key(key)))
            .map_or(0, |dep| dep.len())
    }

    /// Number of containers with at least one tracked location.
    pub fn target_count(&self) -> usize {
        self.inner.targets.borrow().len()
    }

    /// Remove table entries and cached wrappers whose container is gone.
    ///
    /// Returns the number of target entries removed.
    pub fn sweep(&self) -> usize {
        let mut targets = self.inner.targets.borrow_mut();
        let before = targets.len();
        targets.retain(|_, entry| entry.target.strong_count() > 0);
        let removed = before - targets.len();
        drop(targets);

        self.inner
            .observed
            .borrow_mut()
            .retain(|_, weak| weak.strong_count() > 0);
        self.inner
            .readonly
            .borrow_mut()
            .retain(|_, weak| weak.strong_count() > 0);

        debug!(removed, "swept dead targets");
        removed
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("target_count", &self.target_count())
            .field("context_depth", &self.inner.context.depth())
            .finish()
    }
}

/// Restores the trigger depth when a trigger returns, including by `?`.
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}
