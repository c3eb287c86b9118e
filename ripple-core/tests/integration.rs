//! Integration Tests for the Reactive System
//!
//! These tests verify that observed containers, refs, computations, computed
//! values and watchers work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use ripple_core::reactive::{traverse, Deep, JobQueue, Observed, WatchOptions};
use ripple_core::{
    RawContainer, ReactiveError, RunOptions, Store, StoreConfig, TriggerPolicy, Value,
};

fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
    let count = Rc::new(Cell::new(0));
    (count.clone(), count)
}

fn object(store: &Store, json: serde_json::Value) -> Observed {
    store
        .wrap(Value::from(json))
        .into_container()
        .expect("json object")
}

/// Scenario A: an effect sees the latest value of what it read.
#[test]
fn effect_sees_latest_value() {
    let store = Store::new();
    let state = object(&store, json!({ "count": 0 }));
    let seen = Rc::new(Cell::new(-1.0));

    let reader = state.clone();
    let seen_clone = seen.clone();
    let _effect = store
        .run_tracked(
            move || {
                seen_clone.set(reader.get_f64("count").unwrap_or_default());
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();
    assert_eq!(seen.get(), 0.0);

    state.set("count", 1).unwrap();
    assert_eq!(seen.get(), 1.0);
}

/// Every write of a different value re-runs the dependent.
#[test]
fn effect_reruns_once_per_changing_write() {
    let store = Store::new();
    let state = object(&store, json!({ "n": 0 }));
    let (runs, runs_clone) = counter();

    let reader = state.clone();
    let _effect = store
        .run_tracked(
            move || {
                reader.get("n");
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();

    for n in 1..=5 {
        state.set("n", n).unwrap();
    }
    assert_eq!(runs.get(), 6);
}

/// Writing the current value (same-value identity, NaN included) triggers nobody.
#[test]
fn identical_writes_do_not_trigger() {
    let store = Store::new();
    let state = object(&store, json!({ "n": 1, "s": "x" }));
    state.set("nan", f64::NAN).unwrap();
    let (runs, runs_clone) = counter();

    let reader = state.clone();
    let _effect = store
        .run_tracked(
            move || {
                reader.get("n");
                reader.get("s");
                reader.get("nan");
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();

    state.set("n", 1).unwrap();
    state.set("s", "x").unwrap();
    state.set("nan", f64::NAN).unwrap();
    assert_eq!(runs.get(), 1);

    // +0 and -0 are different values.
    state.set("n", 0.0).unwrap();
    state.set("n", -0.0).unwrap();
    assert_eq!(runs.get(), 3);
}

/// Scenario D: dependencies read only under a branch are dropped once the
/// branch is no longer taken.
#[test]
fn stale_branch_dependencies_are_pruned() {
    let store = Store::new();
    let state = object(&store, json!({ "flag": true, "a": 1, "b": 2 }));
    let (runs, runs_clone) = counter();

    let reader = state.clone();
    let _effect = store
        .run_tracked(
            move || {
                runs_clone.set(runs_clone.get() + 1);
                let key = if reader.get_bool("flag").unwrap_or(false) {
                    "a"
                } else {
                    "b"
                };
                Ok(reader.get_f64(key))
            },
            RunOptions::default(),
        )
        .unwrap();
    assert_eq!(store.dependent_count(&state, "a"), 1);
    assert_eq!(store.dependent_count(&state, "b"), 0);

    state.set("flag", false).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(store.dependent_count(&state, "a"), 0);

    state.set("a", 10).unwrap();
    assert_eq!(runs.get(), 2);

    state.set("b", 20).unwrap();
    assert_eq!(runs.get(), 3);
}

/// Scenario B: a computed read twice without a write runs its getter once.
#[test]
fn computed_caches_between_reads() {
    let store = Store::new();
    let a = store.new_ref(1);
    let (calls, calls_clone) = counter();

    let reader = a.clone();
    let b = store.computed(move || {
        calls_clone.set(calls_clone.get() + 1);
        Ok(reader.get() * 2)
    });

    assert_eq!(b.value().unwrap(), 2);
    assert_eq!(b.value().unwrap(), 2);
    assert_eq!(calls.get(), 1);
}

/// After a dependency write, the next read recomputes exactly once.
#[test]
fn computed_revalidates_after_write() {
    let store = Store::new();
    let a = store.new_ref(1);
    let (calls, calls_clone) = counter();

    let reader = a.clone();
    let b = store.computed(move || {
        calls_clone.set(calls_clone.get() + 1);
        Ok(reader.get() * 2)
    });
    assert_eq!(b.value().unwrap(), 2);

    a.set(4).unwrap();
    assert!(b.is_dirty());
    assert_eq!(calls.get(), 1);

    assert_eq!(b.value().unwrap(), 8);
    assert_eq!(b.value().unwrap(), 8);
    assert_eq!(calls.get(), 2);
}

/// Computeds can depend on other computeds, and effects re-run through the chain.
#[test]
fn computed_chain_reaches_effects() {
    let store = Store::new();
    let base = store.new_ref(1);

    let reader = base.clone();
    let doubled = store.computed(move || Ok(reader.get() * 2));
    let doubled_reader = doubled.clone();
    let quadrupled = store.computed(move || Ok(doubled_reader.value()? * 2));

    let seen = Rc::new(Cell::new(0));
    let seen_clone = seen.clone();
    let quadrupled_reader = quadrupled.clone();
    let _effect = store
        .run_tracked(
            move || {
                seen_clone.set(quadrupled_reader.value()?);
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();
    assert_eq!(seen.get(), 4);

    base.set(3).unwrap();
    assert_eq!(seen.get(), 12);
    assert!(!doubled.is_dirty());
}

/// A computation that reads and writes the same key finishes in one run.
#[test]
fn self_write_does_not_recurse() {
    let store = Store::new();
    let state = object(&store, json!({ "n": 0 }));
    let (runs, runs_clone) = counter();

    let target = state.clone();
    let effect = store
        .run_tracked(
            move || {
                runs_clone.set(runs_clone.get() + 1);
                let n = target.get_f64("n").unwrap_or_default();
                target.set("n", n + 1.0)
            },
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(runs.get(), 1);
    assert_eq!(state.get_f64("n"), Some(1.0));

    // An outside write re-runs it once, and its own write stays silent.
    state.set("n", 10).unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(state.get_f64("n"), Some(11.0));
    assert_eq!(effect.run_count(), 2);
}

/// Two computations that keep writing each other's inputs are cut off by the
/// trigger depth limit instead of looping or leaving stale state behind.
#[test]
fn mutual_writes_hit_the_depth_limit() {
    let store = Store::with_config(StoreConfig::default().with_max_trigger_depth(8));
    let x = store.new_ref(0);
    let y = store.new_ref(0);

    let (x_reader, y_writer) = (x.clone(), y.clone());
    let _forward = store
        .run_tracked(move || y_writer.set(x_reader.get() + 1), RunOptions::default())
        .unwrap();
    assert_eq!(y.get_untracked(), 1);

    let (y_reader, x_writer) = (y.clone(), x.clone());
    let backward = store.run_tracked(move || x_writer.set(y_reader.get() + 1), RunOptions::default());
    assert!(matches!(backward, Err(ReactiveError::TriggerDepthExceeded { limit: 8 })));
}

/// A nested computation writing what its parent read re-runs the parent, so
/// the parent ends up seeing the latest value.
#[test]
fn nested_write_refreshes_the_parent() {
    let store = Store::new();
    let state = object(&store, json!({ "a": 0 }));
    let seen = Rc::new(Cell::new(-1.0));

    let (reader, writer, sink, inner_store) = (state.clone(), state.clone(), seen.clone(), store.clone());
    let outer = store
        .run_tracked(
            move || {
                sink.set(reader.get_f64("a").unwrap_or_default());
                let writer = writer.clone();
                inner_store
                    .run_tracked(move || writer.set("a", 1), RunOptions::default())
                    .map(drop)
            },
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(state.get_f64("a"), Some(1.0));
    assert_eq!(seen.get(), 1.0);
    assert_eq!(outer.run_count(), 2);
}

/// After stop, no write re-runs the computation.
#[test]
fn stopped_effect_does_not_run() {
    let store = Store::new();
    let state = object(&store, json!({ "a": 0, "b": 0 }));

    let reader = state.clone();
    let effect = store
        .run_tracked(
            move || {
                reader.get("a");
                reader.get("b");
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();
    effect.stop();

    state.set("a", 1).unwrap();
    state.set("b", 1).unwrap();
    assert_eq!(effect.run_count(), 1);
    assert_eq!(store.target_count(), 0);
}

/// Dropping a computation handle unsubscribes it.
#[test]
fn dropped_effect_does_not_run() {
    let store = Store::new();
    let state = object(&store, json!({ "a": 0 }));
    let (runs, runs_clone) = counter();

    let reader = state.clone();
    let effect = store
        .run_tracked(
            move || {
                reader.get("a");
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();
    drop(effect);

    state.set("a", 1).unwrap();
    assert_eq!(runs.get(), 1);
    assert_eq!(store.target_count(), 0);
}

/// Scenario C: a watch callback receives the new and the old value.
#[test]
fn watch_reports_old_and_new() {
    let store = Store::new();
    let state = object(&store, json!({ "msg": "a" }));
    let log = Rc::new(RefCell::new(Vec::new()));

    let reader = state.clone();
    let sink = log.clone();
    let _watcher = store
        .watch(
            move || Ok(reader.get_str("msg").unwrap_or_default()),
            move |new: &String, old: Option<&String>| {
                sink.borrow_mut().push((old.cloned(), new.clone()));
                Ok(())
            },
            WatchOptions::default(),
        )
        .unwrap();

    state.set("msg", "b").unwrap();
    assert_eq!(
        *log.borrow(),
        vec![(Some("a".to_string()), "b".to_string())]
    );
}

/// An immediate watch fires at creation with no old value.
#[test]
fn immediate_watch_fires_at_creation() {
    let store = Store::new();
    let count = store.new_ref(3);
    let log = Rc::new(RefCell::new(Vec::new()));

    let sink = log.clone();
    let _watcher = store
        .watch(
            count.clone(),
            move |new: &i32, old: Option<&i32>| {
                sink.borrow_mut().push((*new, old.copied()));
                Ok(())
            },
            WatchOptions::immediate(),
        )
        .unwrap();
    count.set(4).unwrap();

    assert_eq!(*log.borrow(), vec![(3, None), (4, Some(3))]);
}

/// A deep watch fires for writes anywhere below the root.
#[test]
fn deep_watch_sees_nested_changes() {
    let store = Store::new();
    let state = object(&store, json!({ "user": { "name": "ada", "tags": ["x"] } }));
    let (fired, fired_clone) = counter();

    let watcher = store
        .watch(
            Deep(state.clone()),
            move |_: &Observed, _: Option<&Observed>| {
                fired_clone.set(fired_clone.get() + 1);
                Ok(())
            },
            WatchOptions::default(),
        )
        .unwrap();

    let user = state.get_container("user").unwrap();
    user.set("name", "grace").unwrap();
    user.get_container("tags").unwrap().push("y").unwrap();
    assert!(fired.get() >= 2);

    watcher.stop();
    let before = fired.get();
    user.set("name", "alan").unwrap();
    assert_eq!(fired.get(), before);
}

/// Traversal tracks every reachable key, once per container.
#[test]
fn traverse_tracks_nested_keys() {
    let store = Store::new();
    let state = object(&store, json!({ "a": { "b": 1 }, "c": 2 }));

    let reader = state.clone();
    let effect = store
        .run_tracked(
            move || {
                traverse(&reader);
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();

    // Root: Keys, a, c. Nested: Keys, b.
    assert_eq!(effect.dependency_count(), 5);
    assert_eq!(store.target_count(), 2);
}

/// Array length and key-set reads are re-run by pushes and deletes.
#[test]
fn array_length_and_keys_are_tracked() {
    let store = Store::new();
    let list = object(&store, json!({ "items": [1, 2] }))
        .get_container("items")
        .unwrap();
    let lengths = Rc::new(RefCell::new(Vec::new()));

    let reader = list.clone();
    let sink = lengths.clone();
    let _effect = store
        .run_tracked(
            move || {
                sink.borrow_mut().push(reader.len());
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();

    list.push(3).unwrap();
    list.set(1_usize, 20).unwrap();
    assert_eq!(*lengths.borrow(), vec![2, 3]);

    assert!(list.delete(0_usize).unwrap());
    assert_eq!(list.len(), 3);
    assert!(list.get(0_usize).is_none());
    assert!(!list.delete(0_usize).unwrap());
    assert_eq!(list.to_json().unwrap(), json!([null, 20.0, 3.0]));
}

/// Object key sets are re-read when keys are added or removed.
#[test]
fn object_key_set_is_tracked() {
    let store = Store::new();
    let state = object(&store, json!({ "a": 1 }));
    let (runs, runs_clone) = counter();

    let reader = state.clone();
    let _effect = store
        .run_tracked(
            move || {
                reader.keys();
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();

    state.set("a", 2).unwrap();
    assert_eq!(runs.get(), 1);

    state.set("b", 1).unwrap();
    assert!(state.delete("a").unwrap());
    assert!(!state.delete("missing").unwrap());
    assert_eq!(runs.get(), 3);
}

/// Wrapping is identity-cached and non-containers pass through.
#[test]
fn wrap_is_identity_cached() {
    let store = Store::new();
    let raw = RawContainer::from_entries([("a", 1)]);

    let first = store.wrap_container(&raw);
    let second = store.wrap(raw.clone()).into_container().unwrap();
    assert!(first.ptr_eq(&second));
    assert!(!first.ptr_eq(&store.readonly(&raw)));

    assert_eq!(store.wrap(5).as_f64(), Some(5.0));
    assert!(store.wrap(Value::Null).is_null());
}

/// Read-only wrappers track reads but reject every write.
#[test]
fn readonly_wrappers_reject_writes() {
    let store = Store::new();
    let state = object(&store, json!({ "nested": { "x": 1 } }));
    let view = state.readonly();

    assert!(matches!(view.set("y", 1), Err(ReactiveError::ReadOnly { .. })));
    assert!(matches!(view.delete("nested"), Err(ReactiveError::ReadOnly { .. })));

    let nested = view.get_container("nested").unwrap();
    assert!(nested.is_readonly());
    assert!(nested.set("x", 2).is_err());

    let seen = Rc::new(Cell::new(0.0));
    let seen_clone = seen.clone();
    let _effect = store
        .run_tracked(
            move || {
                seen_clone.set(nested.get_f64("x").unwrap_or_default());
                Ok(())
            },
            RunOptions::default(),
        )
        .unwrap();

    state.get_container("nested").unwrap().set("x", 5).unwrap();
    assert_eq!(seen.get(), 5.0);
}

/// A failing dependent surfaces at the write site; by default the rest of
/// the batch is abandoned.
#[test]
fn abort_policy_stops_the_batch() {
    let store = Store::new();
    let count = store.new_ref(0);

    let reader = count.clone();
    let _failing = store
        .run_tracked(
            move || match reader.get() {
                0 => Ok(()),
                n => Err(ReactiveError::body(format!("cannot handle {n}"))),
            },
            RunOptions::default(),
        )
        .unwrap();
    let reader = count.clone();
    let behind = store
        .run_tracked(move || Ok(reader.get()), RunOptions::default())
        .unwrap();

    let err = count.set(1).unwrap_err();
    assert!(matches!(err, ReactiveError::Body(ref msg) if msg == "cannot handle 1"));
    assert_eq!(behind.run_count(), 1);
    assert_eq!(count.get_untracked(), 1);
}

/// With the isolate policy every dependent runs and the first error is returned.
#[test]
fn isolate_policy_runs_every_dependent() {
    let store = Store::with_config(StoreConfig::default().with_trigger_policy(TriggerPolicy::Isolate));
    let count = store.new_ref(0);

    let _failing: Vec<_> = (0..2)
        .map(|_| {
            let reader = count.clone();
            store
                .run_tracked(
                    move || match reader.get() {
                        0 => Ok(()),
                        _ => Err(ReactiveError::body("boom")),
                    },
                    RunOptions::default(),
                )
                .unwrap()
        })
        .collect();
    let reader = count.clone();
    let behind = store
        .run_tracked(move || Ok(reader.get()), RunOptions::default())
        .unwrap();

    assert!(matches!(count.set(1), Err(ReactiveError::Body(_))));
    assert_eq!(behind.run_count(), 2);
}

/// Deep synchronous trigger chains fail cleanly at the configured limit.
#[test]
fn trigger_depth_is_bounded() {
    let config = StoreConfig::from_json(r#"{ "max_trigger_depth": 3 }"#).unwrap();
    let store = Store::with_config(config);
    let cells: Vec<_> = (0..6).map(|_| store.new_ref(0)).collect();

    let effects: Vec<_> = cells
        .windows(2)
        .map(|pair| {
            let (from, to) = (pair[0].clone(), pair[1].clone());
            store
                .run_tracked(move || to.set(from.get()), RunOptions::default())
                .unwrap()
        })
        .collect();

    let err = cells[0].set(1).unwrap_err();
    assert!(matches!(err, ReactiveError::TriggerDepthExceeded { limit: 3 }));
    assert_eq!(cells[3].get_untracked(), 1);
    assert_eq!(cells[4].get_untracked(), 0);
    drop(effects);
}

/// A job queue coalesces repeated triggers into one run per flush.
#[test]
fn job_queue_batches_reruns() {
    let store = Store::new();
    let queue = JobQueue::new();
    let state = object(&store, json!({ "a": 0, "b": 0 }));
    let (renders, renders_clone) = counter();

    let reader = state.clone();
    let _render = store
        .run_tracked(
            move || {
                reader.get("a");
                reader.get("b");
                renders_clone.set(renders_clone.get() + 1);
                Ok(())
            },
            RunOptions::default().with_scheduler_rc(queue.scheduler()),
        )
        .unwrap();

    state.set("a", 1).unwrap();
    state.set("b", 1).unwrap();
    state.set("a", 2).unwrap();
    assert_eq!(renders.get(), 1);
    assert_eq!(queue.len(), 1);

    assert_eq!(queue.flush().unwrap(), 1);
    assert_eq!(renders.get(), 2);
    assert_eq!(queue.flush().unwrap(), 0);
}

/// Reads inside `untracked` register nothing.
#[test]
fn untracked_reads_are_not_dependencies() {
    let store = Store::new();
    let state = object(&store, json!({ "a": 0 }));

    let reader = state.clone();
    let inner_store = store.clone();
    let effect = store
        .run_tracked(
            move || Ok(inner_store.untracked(|| reader.get_f64("a"))),
            RunOptions::default(),
        )
        .unwrap();

    state.set("a", 1).unwrap();
    assert_eq!(effect.run_count(), 1);
    assert_eq!(effect.dependency_count(), 0);
}

/// Snapshots round-trip through JSON and reflect writes.
#[test]
fn json_snapshot_reflects_writes() {
    let store = Store::new();
    let state = object(&store, json!({ "name": "ada", "langs": ["en"] }));

    state.get_container("langs").unwrap().push("fr").unwrap();
    state.set("age", 36).unwrap();

    assert_eq!(
        state.to_json().unwrap(),
        json!({ "name": "ada", "langs": ["en", "fr"], "age": 36.0 })
    );
}
