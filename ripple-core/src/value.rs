//! Plain Data Model
//!
//! The engine observes plain, shared, identity-carrying containers. A
//! [`RawContainer`] is either an object (insertion-ordered string keys) or an
//! array. Raw containers know nothing about tracking: reads and writes made
//! directly on them are invisible to the reactive system. Wrap them with
//! [`Store::wrap_container`](crate::reactive::Store::wrap_container) to get
//! an observed view.
//!
//! # Identity
//!
//! Every raw container is assigned a [`TargetId`] from a monotonically
//! increasing counter when it is created. Ids are never reused, so the
//! dependency store can key its tables by id and hold only a weak reference
//! to the container itself.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::{ReactiveError, Result};

/// Stable identity of a raw container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// A property key: an object field or an array position.
///
/// An `Index` used on an object addresses the field named by its decimal
/// form, so `Key::Index(1)` and `Key::from("1")` name the same property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl From<&str> for Key {
    fn from(field: &str) -> Self {
        Key::Field(field.to_string())
    }
}

impl From<String> for Key {
    fn from(field: String) -> Self {
        Key::Field(field)
    }
}

impl From<&String> for Key {
    fn from(field: &String) -> Self {
        Key::Field(field.clone())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(field) => f.write_str(field),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Strict identity comparison, the equality used to decide whether a write
/// changed anything.
///
/// Numbers compare NaN-aware: NaN is the same value as NaN, while `0.0` and
/// `-0.0` are different. Shared handles compare by pointer.
pub trait SameValue {
    fn same_value(&self, other: &Self) -> bool;
}

impl SameValue for f64 {
    fn same_value(&self, other: &Self) -> bool {
        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
    }
}

impl SameValue for f32 {
    fn same_value(&self, other: &Self) -> bool {
        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
    }
}

macro_rules! same_value_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_by_eq!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, bool, char, (), String,
    &'static str,
);

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: SameValue> SameValue for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }
}

impl<T: ?Sized> SameValue for Rc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

/// A plain value stored inside a container or a ref.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Container(RawContainer),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&RawContainer> {
        match self {
            Value::Container(raw) => Some(raw),
            _ => None,
        }
    }

    /// Snapshot this value, and everything reachable from it, as JSON.
    ///
    /// Shared sub-containers are copied once per occurrence. Cyclic data
    /// yields [`ReactiveError::Cycle`].
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut HashSet<TargetId>) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Container(raw) => {
                if !path.insert(raw.id()) {
                    return Err(ReactiveError::Cycle);
                }
                let json = raw.with_data(|data| -> Result<serde_json::Value> {
                    Ok(match data {
                        Data::Object(map) => {
                            let mut out = serde_json::Map::with_capacity(map.len());
                            for (field, value) in map {
                                out.insert(field.clone(), value.to_json_inner(path)?);
                            }
                            serde_json::Value::Object(out)
                        }
                        Data::Array(items) => serde_json::Value::Array(
                            items
                                .iter()
                                .map(|slot| match slot {
                                    Some(value) => value.to_json_inner(path),
                                    None => Ok(serde_json::Value::Null),
                                })
                                .collect::<Result<_>>()?,
                        ),
                    })
                })?;
                path.remove(&raw.id());
                json
            }
        })
    }
}

impl SameValue for Value {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.same_value(b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Container(a), Value::Container(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! value_from_number {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

value_from_number!(f32, i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<RawContainer> for Value {
    fn from(raw: RawContainer) -> Self {
        Value::Container(raw)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Container(RawContainer::from_values(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(map) => Value::Container(RawContainer::from_entries(
                map.into_iter().map(|(field, value)| (field, Value::from(value))),
            )),
        }
    }
}

/// Outcome of a raw write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Write {
    /// The new value is the same value as the old one. Nothing was written.
    Unchanged,
    /// An existing property was overwritten.
    Updated,
    /// A new property was created inside the current bounds: an object
    /// field, or an array hole that now holds a value.
    Added,
    /// An array slot was created past the end; the length grew.
    Appended,
}

/// Largest array index a write may create.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

/// The backing storage of a raw container.
///
/// Array slots that were never written, or were deleted, are holes
/// (`None`). A hole counts towards the length but is absent for reads,
/// membership and key listing.
#[derive(Debug, Clone)]
pub enum Data {
    Object(IndexMap<String, Value>),
    Array(Vec<Option<Value>>),
}

impl Data {
    pub fn len(&self) -> usize {
        match self {
            Data::Object(map) => map.len(),
            Data::Array(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<Key> {
        match self {
            Data::Object(map) => map.keys().cloned().map(Key::Field).collect(),
            Data::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_some())
                .map(|(index, _)| Key::Index(index))
                .collect(),
        }
    }

    /// Map `key` to the canonical key for this container kind.
    ///
    /// Returns `None` for a non-numeric field on an array.
    pub fn normalize(&self, key: &Key) -> Option<Key> {
        match (self, key) {
            (Data::Object(_), Key::Field(_)) | (Data::Array(_), Key::Index(_)) => Some(key.clone()),
            (Data::Object(_), Key::Index(index)) => Some(Key::Field(index.to_string())),
            (Data::Array(_), Key::Field(field)) => field.parse().ok().map(Key::Index),
        }
    }

    /// Read a canonical key.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        match (self, key) {
            (Data::Object(map), Key::Field(field)) => map.get(field),
            (Data::Array(items), Key::Index(index)) => items.get(*index).and_then(Option::as_ref),
            _ => None,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Write a canonical key. Writing past the end of an array leaves the
    /// skipped slots as holes.
    ///
    /// Fails without writing if an array index exceeds [`MAX_ARRAY_INDEX`]
    /// or the array cannot grow to reach it.
    pub(crate) fn write(&mut self, key: Key, value: Value) -> Result<Write> {
        Ok(match (self, key) {
            (Data::Object(map), Key::Field(field)) => match map.get_mut(&field) {
                Some(current) if current.same_value(&value) => Write::Unchanged,
                Some(current) => {
                    *current = value;
                    Write::Updated
                }
                None => {
                    map.insert(field, value);
                    Write::Added
                }
            },
            (Data::Array(items), Key::Index(index)) => match items.get_mut(index) {
                Some(Some(current)) if current.same_value(&value) => Write::Unchanged,
                Some(Some(current)) => {
                    *current = value;
                    Write::Updated
                }
                Some(hole) => {
                    *hole = Some(value);
                    Write::Added
                }
                None => {
                    let out_of_range = || ReactiveError::InvalidKey {
                        key: index.to_string(),
                        reason: "index out of range",
                    };
                    if index > MAX_ARRAY_INDEX {
                        return Err(out_of_range());
                    }
                    items
                        .try_reserve_exact(index + 1 - items.len())
                        .map_err(|_| out_of_range())?;
                    items.resize(index, None);
                    items.push(Some(value));
                    Write::Appended
                }
            },
            _ => Write::Unchanged,
        })
    }

    /// Remove a canonical key, reporting whether it existed.
    ///
    /// A removed array slot becomes a hole; an array never shrinks.
    pub(crate) fn remove(&mut self, key: &Key) -> bool {
        match (self, key) {
            (Data::Object(map), Key::Field(field)) => map.shift_remove(field).is_some(),
            (Data::Array(items), Key::Index(index)) => items
                .get_mut(*index)
                .is_some_and(|slot| slot.take().is_some()),
            _ => false,
        }
    }
}

pub(crate) struct RawInner {
    id: TargetId,
    data: RefCell<Data>,
}

/// A shared plain container.
///
/// Cloning a `RawContainer` clones the handle, not the data; clones share
/// identity.
#[derive(Clone)]
pub struct RawContainer {
    inner: Rc<RawInner>,
}

impl RawContainer {
    pub fn from_data(data: Data) -> Self {
        Self {
            inner: Rc::new(RawInner {
                id: TargetId::next(),
                data: RefCell::new(data),
            }),
        }
    }

    /// Create an empty object.
    pub fn object() -> Self {
        Self::from_data(Data::Object(IndexMap::new()))
    }

    /// Create an empty array.
    pub fn array() -> Self {
        Self::from_data(Data::Array(Vec::new()))
    }

    /// Create an object from `(field, value)` pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::from_data(Data::Object(
            entries
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        ))
    }

    /// Create an array from values.
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::from_data(Data::Array(
            values.into_iter().map(|value| Some(value.into())).collect(),
        ))
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &RawContainer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_array(&self) -> bool {
        self.with_data(|data| matches!(data, Data::Array(_)))
    }

    /// Borrow the backing data. Untracked.
    pub fn with_data<R>(&self, f: impl FnOnce(&Data) -> R) -> R {
        f(&self.inner.data.borrow())
    }

    pub(crate) fn with_data_mut<R>(&self, f: impl FnOnce(&mut Data) -> R) -> R {
        f(&mut self.inner.data.borrow_mut())
    }

    /// Read a property without tracking.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        self.with_data(|data| data.normalize(&key).and_then(|key| data.get(&key).cloned()))
    }

    /// Write a property without triggering.
    ///
    /// Dependents of the property are not notified. Use an observed wrapper
    /// for writes that should propagate.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        self.with_data_mut(|data| match data.normalize(&key) {
            Some(key) => data.write(key, value).map(drop),
            None => Err(ReactiveError::InvalidKey {
                key: key.to_string(),
                reason: "arrays are indexed by position",
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.with_data(Data::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn downgrade(&self) -> Weak<RawInner> {
        Rc::downgrade(&self.inner)
    }
}

impl SameValue for RawContainer {
    fn same_value(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for RawContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Contents are not printed: containers may be cyclic.
        let (kind, len) = self.with_data(|data| match data {
            Data::Object(map) => ("object", map.len()),
            Data::Array(items) => ("array", items.len()),
        });
        f.debug_struct("RawContainer")
            .field("id", &self.id())
            .field("kind", &kind)
            .field("len", &len)
            .finish()
    }
}
