//! Reactive Primitives
//!
//! This module implements the dependency-tracking engine: observed
//! containers, refs, computations, computed values and watchers. Everything
//! hangs off a [`Store`].
//!
//! # Concepts
//!
//! ## Observed Containers and Refs
//!
//! An [`Observed`] wraps a raw object or array. Reading a key inside a
//! running computation records the computation as a dependent of that key;
//! writing a different value to the key notifies every dependent. A [`Ref`]
//! does the same for a single value.
//!
//! ## Computations
//!
//! A [`Computation`] is a tracked unit of work. It re-runs (or hands itself
//! to its scheduler) when something it read during its last run changes.
//! Dependencies are re-collected on every run, so reads from branches that
//! are no longer taken are dropped.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a cached derived value. It recomputes lazily, on the
//! first read after a dependency changed.
//!
//! ## Watchers
//!
//! [`watch`] calls back with the new and old value of a source whenever the
//! source's dependencies are triggered.
//!
//! # Implementation Notes
//!
//! Dependency discovery is automatic: the store keeps a stack of running
//! computations, and every tracked read consults the top of that stack. The
//! store holds containers and computations weakly; handles own them.

mod computed;
mod context;
mod effect;
mod observed;
mod queue;
mod ref_cell;
mod store;
mod subscriber;
mod watch;

pub use computed::{computed, Computed, ComputedState};
pub use effect::{run_tracked, Computation, RunOptions, Scheduler};
pub use observed::{Observed, Tracked};
pub use queue::JobQueue;
pub use ref_cell::Ref;
pub use store::Store;
pub use subscriber::ComputationId;
pub use watch::{traverse, watch, Deep, WatchHandle, WatchOptions, WatchSource};
