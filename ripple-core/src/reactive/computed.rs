//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when it is
//! read after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. A computed starts dirty. The first read runs the getter under
//!    tracking, caches the result and marks the computed clean.
//!
//! 2. Reads while clean return the cached value without running the getter.
//!
//! 3. When a dependency of the getter changes, the computed's scheduler marks
//!    it dirty and notifies whoever read the computed. Nothing is recomputed
//!    at that point.
//!
//! 4. The next read re-runs the getter.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A location changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay dirty (no wasted work)
//!
//! A getter should not write observed state. If something it read changes
//! while it is still running, the result is cached but the computed stays
//! dirty, so the next read evaluates again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::effect::{Computation, Scheduler};
use super::store::Store;
use super::subscriber::Dep;
use crate::error::Result;

/// Dirty state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed since the last evaluation, or there has been
    /// none yet.
    Dirty,
}

/// Create a lazily evaluated, cached derived value on `store`.
pub fn computed<T, F>(store: &Store, getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: FnMut() -> Result<T> + 'static,
{
    Computed::new(store, getter)
}

struct ComputedInner<T> {
    store: Store,

    /// The getter, wrapped in a computation whose scheduler only marks
    /// this computed dirty.
    effect: Computation<T>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,

    dirty: Cell<bool>,

    /// Computations that read this computed.
    observers: Rc<Dep>,
}

/// A lazily evaluated, cached derived value.
///
/// Reading a computed inside a computation makes that computation depend on
/// it: when the computed goes dirty, its readers are triggered and pull the
/// new value on their next read.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a new computed with the given getter.
    ///
    /// The getter is not run immediately. It runs on first read.
    pub fn new<F>(store: &Store, getter: F) -> Self
    where
        F: FnMut() -> Result<T> + 'static,
    {
        let inner = Rc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let this = this.clone();
            let scheduler: Scheduler<T> = Rc::new(move |_: &Computation<T>| match this.upgrade() {
                Some(computed) => computed.invalidate(),
                None => Ok(()),
            });

            ComputedInner {
                store: store.clone(),
                effect: Computation::build(store, Box::new(getter), Some(scheduler)),
                value: RefCell::new(None),
                dirty: Cell::new(true),
                observers: Dep::owned(),
            }
        });

        Self { inner }
    }

    /// Get the current value, recomputing if dirty.
    ///
    /// An error from the getter is returned and the computed stays dirty.
    pub fn value(&self) -> Result<T> {
        let inner = &self.inner;
        inner.store.track_dep(&inner.observers);

        if !inner.dirty.get() {
            if let Some(value) = inner.value.borrow().as_ref() {
                return Ok(value.clone());
            }
        }

        // Cleared first: an invalidation raised while the getter runs keeps
        // the computed dirty.
        inner.dirty.set(false);
        let value = inner.effect.run().map_err(|err| {
            inner.dirty.set(true);
            err
        })?;
        *inner.value.borrow_mut() = Some(value.clone());
        Ok(value)
    }
}

impl<T: 'static> Computed<T> {
    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        if self.inner.dirty.get() {
            ComputedState::Dirty
        } else {
            ComputedState::Clean
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the number of computations reading this computed.
    pub fn dependent_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Stop tracking the getter's dependencies. The cached value stays
    /// readable but is never invalidated again.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.effect.is_active()
    }
}

impl<T: 'static> ComputedInner<T> {
    /// Scheduler body: go dirty once and tell our readers.
    fn invalidate(&self) -> Result<()> {
        if self.dirty.replace(true) {
            return Ok(());
        }
        self.store.trigger_dep(&self.observers)
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("effect", &self.inner.effect)
            .field("state", &self.state())
            .field("value", &self.inner.value.borrow())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
