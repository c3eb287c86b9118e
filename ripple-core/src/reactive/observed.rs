//! Observed Containers
//!
//! An [`Observed`] wraps a raw container and routes every access through the
//! store: reads are track points, writes that change something are trigger
//! points.
//!
//! # Reads
//!
//! - [`Observed::get`] tracks the key. A nested container is wrapped on the
//!   way out, so deep observation happens lazily, one level per read.
//! - [`Observed::has`] tracks the key too; membership is a dependency.
//! - [`Observed::keys`] and [`Observed::len`] track the key set and the
//!   array length.
//!
//! # Writes
//!
//! - [`Observed::set`] skips the trigger when the new value is the same
//!   value as the old one.
//! - [`Observed::delete`] triggers only if the key existed.
//! - Adding or removing a key also triggers the key set; growing an array
//!   also triggers its length.
//!
//! Deleting an array slot leaves a hole: the length is unchanged, but the
//! slot reads as absent until it is written again.
//!
//! A read-only wrapper tracks reads like any other but refuses every write
//! with [`ReactiveError::ReadOnly`]. Nested containers read through it come
//! back read-only as well.

use std::fmt;
use std::rc::{Rc, Weak};

use super::store::{Location, Store};
use crate::error::{ReactiveError, Result};
use crate::value::{Data, Key, RawContainer, SameValue, TargetId, Value, Write};

pub(crate) struct ObservedInner {
    store: Store,
    raw: RawContainer,
    readonly: bool,
}

/// An observed view of a raw container.
///
/// Obtain one from [`Store::wrap_container`], [`Store::readonly`] or
/// [`Store::wrap`]. Cloning shares the wrapper.
#[derive(Clone)]
pub struct Observed {
    inner: Rc<ObservedInner>,
}

/// The result of reading through an observed container: either a plain
/// value or the observed wrapper of a nested container.
#[derive(Debug, Clone)]
pub enum Tracked {
    Value(Value),
    Container(Observed),
}

impl Observed {
    pub(crate) fn new(store: Store, raw: RawContainer, readonly: bool) -> Self {
        Self {
            inner: Rc::new(ObservedInner {
                store,
                raw,
                readonly,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<ObservedInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ObservedInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn id(&self) -> TargetId {
        self.inner.raw.id()
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.readonly
    }

    pub fn is_array(&self) -> bool {
        self.inner.raw.is_array()
    }

    /// Whether both handles are the same wrapper.
    pub fn ptr_eq(&self, other: &Observed) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The raw container behind this wrapper.
    pub fn to_raw(&self) -> RawContainer {
        self.inner.raw.clone()
    }

    /// The read-only wrapper of the same raw container.
    pub fn readonly(&self) -> Observed {
        self.inner.store.readonly(&self.inner.raw)
    }

    fn normalize(&self, key: &Key) -> Option<Key> {
        self.inner.raw.with_data(|data| data.normalize(key))
    }

    fn track(&self, location: Location) {
        self.inner.store.track(&self.inner.raw, location);
    }

    fn trigger(&self, location: Location) -> Result<()> {
        self.inner.store.trigger(self.id(), &location)
    }

    fn wrap_child(&self, value: Value) -> Tracked {
        match value {
            Value::Container(raw) if self.inner.readonly => {
                Tracked::Container(self.inner.store.readonly(&raw))
            }
            Value::Container(raw) => Tracked::Container(self.inner.store.wrap_container(&raw)),
            other => Tracked::Value(other),
        }
    }

    fn ensure_writable(&self, key: &Key) -> Result<()> {
        if self.inner.readonly {
            return Err(ReactiveError::ReadOnly {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read `key`, tracking it.
    pub fn get(&self, key: impl Into<Key>) -> Option<Tracked> {
        let key = self.normalize(&key.into())?;
        self.track(Location::Key(key.clone()));
        let value = self.inner.raw.with_data(|data| data.get(&key).cloned())?;
        Some(self.wrap_child(value))
    }

    /// Whether `key` exists, tracking it.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let Some(key) = self.normalize(&key.into()) else {
            return false;
        };
        let found = self.inner.raw.with_data(|data| data.contains(&key));
        self.track(Location::Key(key));
        found
    }

    /// All keys, in order. Tracks the key set, not the individual keys.
    pub fn keys(&self) -> Vec<Key> {
        self.track(Location::Keys);
        self.inner.raw.with_data(Data::keys)
    }

    /// Number of entries. Tracks the array length, or the key set for an
    /// object.
    pub fn len(&self) -> usize {
        if self.is_array() {
            self.track(Location::Length);
        } else {
            self.track(Location::Keys);
        }
        self.inner.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_f64(&self, key: impl Into<Key>) -> Option<f64> {
        self.get(key).and_then(|tracked| tracked.as_f64())
    }

    pub fn get_bool(&self, key: impl Into<Key>) -> Option<bool> {
        self.get(key).and_then(|tracked| tracked.as_bool())
    }

    pub fn get_str(&self, key: impl Into<Key>) -> Option<String> {
        self.get(key)
            .and_then(|tracked| tracked.as_str().map(str::to_string))
    }

    pub fn get_container(&self, key: impl Into<Key>) -> Option<Observed> {
        self.get(key).and_then(Tracked::into_container)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write `key`, triggering its dependents if the value changed.
    ///
    /// Errors raised by dependents propagate to the caller. The write itself
    /// has happened by then.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        self.ensure_writable(&key)?;
        let key = self.normalize(&key).ok_or_else(|| ReactiveError::InvalidKey {
            key: key.to_string(),
            reason: "arrays are indexed by position",
        })?;

        let value = value.into();
        let write = self
            .inner
            .raw
            .with_data_mut(|data| data.write(key.clone(), value))?;

        match write {
            Write::Unchanged => Ok(()),
            Write::Updated => self.trigger(Location::Key(key)),
            Write::Added => {
                self.trigger(Location::Key(key))?;
                self.trigger(Location::Keys)
            }
            Write::Appended => {
                self.trigger(Location::Key(key))?;
                self.trigger(Location::Length)?;
                self.trigger(Location::Keys)
            }
        }
    }

    /// Remove `key`. Returns whether it existed; only then are dependents
    /// triggered.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        self.ensure_writable(&key)?;
        let Some(key) = self.normalize(&key) else {
            return Ok(false);
        };

        let existed = self.inner.raw.with_data_mut(|data| data.remove(&key));
        if existed {
            self.trigger(Location::Key(key))?;
            self.trigger(Location::Keys)?;
        }
        Ok(existed)
    }

    /// Append to an array.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        if !self.is_array() {
            return Err(ReactiveError::InvalidKey {
                key: "push".into(),
                reason: "only arrays can be pushed to",
            });
        }
        let index = self.inner.raw.len();
        self.set(index, value)
    }

    /// Snapshot the current contents as JSON. Untracked.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Value::Container(self.to_raw()).to_json()
    }
}

impl SameValue for Observed {
    fn same_value(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl From<Observed> for Value {
    fn from(observed: Observed) -> Self {
        Value::Container(observed.to_raw())
    }
}

impl From<&Observed> for Value {
    fn from(observed: &Observed) -> Self {
        Value::Container(observed.to_raw())
    }
}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("raw", &self.inner.raw)
            .field("readonly", &self.inner.readonly)
            .finish()
    }
}

impl Tracked {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Tracked::Value(value) => Some(value),
            Tracked::Container(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Tracked::Value(Value::Null))
    }

    pub fn as_container(&self) -> Option<&Observed> {
        match self {
            Tracked::Container(observed) => Some(observed),
            Tracked::Value(_) => None,
        }
    }

    pub fn into_container(self) -> Option<Observed> {
        match self {
            Tracked::Container(observed) => Some(observed),
            Tracked::Value(_) => None,
        }
    }
}

impl From<Tracked> for Value {
    fn from(tracked: Tracked) -> Self {
        match tracked {
            Tracked::Value(value) => value,
            Tracked::Container(observed) => observed.into(),
        }
    }
}
