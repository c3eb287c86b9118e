//! Ref Implementation
//!
//! A [`Ref`] is a single reactive value. It owns its own dependency set
//! instead of going through the store's target table.
//!
//! Setting a ref to a value that is the [same value](SameValue) as the
//! current one is a no-op: nothing is written and no dependent runs.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::observed::Tracked;
use super::store::Store;
use super::subscriber::Dep;
use crate::error::{ReactiveError, Result};
use crate::value::{SameValue, Value};

struct RefInner<T> {
    store: Store,
    value: RefCell<T>,
    dep: Rc<Dep>,
}

/// A reactive cell holding one value.
///
/// Clones share the cell. A [read-only view](Ref::readonly) shares it too but
/// refuses writes.
pub struct Ref<T> {
    inner: Rc<RefInner<T>>,
    readonly: bool,
}

impl<T> Ref<T>
where
    T: Clone + SameValue + 'static,
{
    pub fn new(store: &Store, value: T) -> Self {
        Self {
            inner: Rc::new(RefInner {
                store: store.clone(),
                value: RefCell::new(value),
                dep: Dep::owned(),
            }),
            readonly: false,
        }
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> T {
        self.inner.store.track_dep(&self.inner.dep);
        self.get_untracked()
    }

    /// Get the current value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and run dependents if it differs from the old one.
    pub fn set(&self, value: T) -> Result<()> {
        if self.readonly {
            return Err(ReactiveError::ReadOnly {
                key: "value".into(),
            });
        }

        {
            let mut current = self.inner.value.borrow_mut();
            if current.same_value(&value) {
                return Ok(());
            }
            *current = value;
        }

        self.inner.store.trigger_dep(&self.inner.dep)
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// A read-only view of the same cell.
    pub fn readonly(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            readonly: true,
        }
    }
}

impl Ref<Value> {
    /// Get the current value with containers wrapped, tracking the read.
    pub fn get_tracked(&self) -> Tracked {
        let value = self.get();
        match value {
            Value::Container(raw) if self.readonly => {
                Tracked::Container(self.inner.store.readonly(&raw))
            }
            other => self.inner.store.wrap(other),
        }
    }
}

impl<T> Ref<T> {
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Whether both handles share the same cell.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Get the number of computations reading this ref.
    pub fn dependent_count(&self) -> usize {
        self.inner.dep.len()
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            readonly: self.readonly,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("value", &self.inner.value.borrow())
            .field("readonly", &self.readonly)
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}
