//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive locations: plain
//! effects, the computation behind a computed value, or a watcher. A
//! [`Dep`] is the set of subscribers of one location.
//!
//! Edges are kept in both directions. A `Dep` holds weak references to its
//! subscribers, so the store never keeps a computation alive. Each
//! subscriber holds strong references to the `Dep`s it belongs to, so it can
//! unsubscribe itself before every re-run in time proportional to its own
//! dependency count.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::store::Location;
use crate::error::Result;
use crate::value::TargetId;

/// Unique identifier for a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputationId(u64);

impl ComputationId {
    /// Generate a new unique computation ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ComputationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The type-erased face of a computation, as seen by the store.
pub(crate) trait Subscriber {
    fn id(&self) -> ComputationId;

    fn is_active(&self) -> bool;

    /// Record the reverse edge to `dep`.
    fn link(&self, dep: &Rc<Dep>);

    /// React to a trigger: invoke the scheduler if there is one, otherwise
    /// re-run.
    fn notify(self: Rc<Self>) -> Result<()>;

    /// Re-run the body, bypassing the scheduler.
    fn execute(self: Rc<Self>) -> Result<()>;

    fn stop(&self);
}

/// Where a dependency set lives.
#[derive(Debug, Clone)]
pub(crate) enum DepOrigin {
    /// A property of an observed container, owned by the store's target
    /// table and pruned from it once empty.
    Location(TargetId, Location),
    /// Owned by a ref or computed value.
    Owned,
}

/// The set of subscribers depending on one location.
pub(crate) struct Dep {
    origin: DepOrigin,
    subscribers: RefCell<IndexMap<ComputationId, Weak<dyn Subscriber>>>,
}

impl Dep {
    pub(crate) fn new(origin: DepOrigin) -> Rc<Self> {
        Rc::new(Self {
            origin,
            subscribers: RefCell::new(IndexMap::new()),
        })
    }

    pub(crate) fn owned() -> Rc<Self> {
        Self::new(DepOrigin::Owned)
    }

    pub(crate) fn origin(&self) -> &DepOrigin {
        &self.origin
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub(crate) fn add(&self, id: ComputationId, subscriber: Weak<dyn Subscriber>) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.contains_key(&id) {
            return false;
        }
        subscribers.insert(id, subscriber);
        true
    }

    pub(crate) fn remove(&self, id: ComputationId) -> bool {
        self.subscribers.borrow_mut().shift_remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: ComputationId) -> bool {
        self.subscribers.borrow().contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    /// Copy out the live subscribers in subscription order.
    ///
    /// Running a subscriber may change this set, so triggers iterate over
    /// the copy. Entries whose computation has been dropped are removed.
    pub(crate) fn snapshot(&self) -> Vec<Rc<dyn Subscriber>> {
        let mut subscribers = self.subscribers.borrow_mut();
        let mut live = Vec::with_capacity(subscribers.len());
        subscribers.retain(|_, weak| match weak.upgrade() {
            Some(subscriber) => {
                live.push(subscriber);
                true
            }
            None => false,
        });
        live
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("origin", &self.origin)
            .field("subscriber_count", &self.len())
            .finish()
    }
}
