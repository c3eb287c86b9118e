//! Ripple Core
//!
//! This crate provides the core runtime for Ripple, an automatic reactive
//! dependency-tracking engine. It implements:
//!
//! - Observed containers and refs whose reads are tracked
//! - Computations that re-run when what they read changes
//! - Lazily re-validated computed values
//! - Watchers with new/old value callbacks
//! - An opt-in job queue for batching re-runs
//!
//! The engine is single-threaded. Renderers and other consumers register
//! their update functions as computations, usually with a scheduler that
//! enqueues instead of running synchronously.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: plain data (raw containers, keys, same-value comparison)
//! - `reactive`: the store, observed containers and the tracked primitives
//! - `config`: store configuration
//! - `error`: the crate error type
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use ripple_core::reactive::WatchOptions;
//! use ripple_core::{RawContainer, Store};
//!
//! let store = Store::new();
//! let state = store.wrap_container(&RawContainer::from_entries([("count", 1)]));
//!
//! // Create a derived value
//! let reader = state.clone();
//! let doubled = store.computed(move || Ok(reader.get_f64("count").unwrap_or_default() * 2.0));
//!
//! // Watch it
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&log);
//! let _watcher = store
//!     .watch(
//!         doubled.clone(),
//!         move |new: &f64, old: Option<&f64>| {
//!             sink.borrow_mut().push((*new, old.copied()));
//!             Ok(())
//!         },
//!         WatchOptions::default(),
//!     )
//!     .unwrap();
//!
//! // Update the state; the watcher runs synchronously
//! state.set("count", 5).unwrap();
//! assert_eq!(*log.borrow(), vec![(10.0, Some(2.0))]);
//! assert_eq!(doubled.value().unwrap(), 10.0);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod value;

pub use config::{StoreConfig, TriggerPolicy};
pub use error::{ReactiveError, Result};
pub use reactive::{
    computed, run_tracked, watch, Computation, Computed, Observed, Ref, RunOptions, Store, Tracked,
};
pub use value::{Key, RawContainer, SameValue, TargetId, Value};
