//! Integration Tests for Reactive System
//!
//! These tests verify that wrappers, effects, computed values and watchers
//! work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use trellis_core::reactive::{
    computed, effect, reactive, readonly, watch, EffectOptions, Reactive, ReactiveEffect, Target,
    Value, WatchOptions, WatchSource,
};
use trellis_core::scheduler::run_microtasks;
use trellis_core::ReactiveError;

/// Register an effect that counts its runs.
fn counting_effect(body: impl Fn() + 'static) -> (Rc<Cell<usize>>, ReactiveEffect) {
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let handle = effect(
        move || {
            counter.set(counter.get() + 1);
            body();
        },
        EffectOptions::default(),
    );
    (runs, handle)
}

/// Writing a field the effect does not read never re-runs it.
#[test]
fn effect_ignores_unread_fields() {
    let obj = Reactive::from_json(json!({ "a": 1, "b": 2, "c": 3 }));
    let reader = obj.clone();
    let (runs, _effect) = counting_effect(move || {
        reader.get("a");
        reader.get("b");
    });
    assert_eq!(runs.get(), 1);

    obj.set("c", 30);
    assert_eq!(runs.get(), 1);

    obj.set("a", 10);
    assert_eq!(runs.get(), 2);
}

/// Dependencies behind a branch no longer taken are dropped.
#[test]
fn effect_prunes_stale_dependencies() {
    let obj = Reactive::from_json(json!({ "ok": true, "text": "hello" }));
    let reader = obj.clone();
    let (runs, _effect) = counting_effect(move || {
        if reader.get("ok").is_truthy() {
            reader.get("text");
        }
    });

    obj.set("ok", false);
    assert_eq!(runs.get(), 2);

    obj.set("text", "world");
    assert_eq!(runs.get(), 2);
}

/// An effect that reads and writes the same field does not recurse.
#[test]
fn effect_does_not_retrigger_itself() {
    let obj = Reactive::from_json(json!({ "foo": 1 }));
    let target = obj.clone();
    let (runs, _effect) = counting_effect(move || {
        let next = target.get("foo").as_f64() + 1.0;
        target.set("foo", next);
    });
    assert_eq!(runs.get(), 1);
    assert_eq!(obj.get("foo").as_f64(), 2.0);
}

/// Computed values evaluate once per change.
#[test]
fn computed_caches_until_dependency_changes() {
    let obj = Reactive::from_json(json!({ "foo": 1, "bar": 2 }));
    let reader = obj.clone();
    let sum = computed(move || reader.get("foo").as_f64() + reader.get("bar").as_f64());

    assert_eq!(sum.get(), 3.0);
    assert_eq!(sum.get(), 3.0);
    assert_eq!(sum.evaluations(), 1);

    obj.set("bar", 5);
    assert_eq!(sum.get(), 6.0);
    assert_eq!(sum.evaluations(), 2);
}

/// An effect reading a computed value re-runs when the computed changes.
#[test]
fn effect_follows_computed() {
    let obj = Reactive::from_json(json!({ "n": 2 }));
    let reader = obj.clone();
    let squared = Rc::new(computed(move || reader.get("n").as_f64().powi(2)));

    let seen = Rc::new(Cell::new(0.0));
    let (source, sink) = (squared.clone(), seen.clone());
    let (_runs, _effect) = counting_effect(move || sink.set(source.get()));
    assert_eq!(seen.get(), 4.0);

    obj.set("n", 3);
    assert_eq!(seen.get(), 9.0);
}

/// Writing NaN over NaN is not a change.
#[test]
fn nan_over_nan_does_not_trigger() {
    let obj = reactive(&Target::from_entries([("x", f64::NAN)]));
    let reader = obj.clone();
    let (runs, _effect) = counting_effect(move || {
        reader.get("x");
    });

    obj.set("x", f64::NAN);
    assert_eq!(runs.get(), 1);
}

/// Truncating an array invalidates readers of the removed indices once.
#[test]
fn array_length_truncation() {
    let arr = Reactive::from_json(json!(["a", "b", "c"]));
    let reader = arr.clone();
    let (runs, _effect) = counting_effect(move || {
        reader.get(2);
    });

    arr.set("length", 1);
    assert_eq!(runs.get(), 2);

    arr.set("length", 1);
    assert_eq!(runs.get(), 2);
}

/// A default watcher calls back synchronously with new and old values.
#[test]
fn watch_getter_is_synchronous() {
    let obj = Reactive::from_json(json!({ "foo": 1 }));
    let calls = Rc::new(RefCell::new(Vec::new()));
    let (reader, log) = (obj.clone(), calls.clone());
    let _watcher = watch(
        WatchSource::getter(move || reader.get("foo")),
        move |new, old, _| log.borrow_mut().push((new.as_f64(), old.as_f64())),
        WatchOptions::default(),
    );

    let next = obj.get("foo").as_f64() + 1.0;
    obj.set("foo", next);
    assert_eq!(*calls.borrow(), vec![(2.0, 1.0)]);
}

/// An immediate watcher fires once at registration.
#[test]
fn watch_immediate_fires_on_registration() {
    let obj = Reactive::from_json(json!({ "foo": 1 }));
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let _watcher = watch(&obj, move |_, _, _| counter.set(counter.get() + 1), WatchOptions::immediate());
    assert_eq!(calls.get(), 1);
}

/// Post-flush watchers see the last of several synchronous writes.
#[test]
fn watch_post_flush_runs_after_microtasks() {
    let obj = Reactive::from_json(json!({ "foo": 1 }));
    let calls = Rc::new(RefCell::new(Vec::new()));
    let (reader, log) = (obj.clone(), calls.clone());
    let _watcher = watch(
        WatchSource::getter(move || reader.get("foo")),
        move |new, _, _| log.borrow_mut().push(new.as_f64()),
        WatchOptions::post(),
    );

    obj.set("foo", 2);
    assert!(calls.borrow().is_empty());
    run_microtasks();
    assert_eq!(calls.borrow().last(), Some(&2.0));
}

/// Map entries trigger on change only.
#[test]
fn map_set_same_value_is_silent() {
    let map = reactive(&Target::map_from([("k", 1)]));
    let reader = map.clone();
    let (runs, _effect) = counting_effect(move || {
        reader.get("k");
    });

    map.set("k", 2);
    assert_eq!(runs.get(), 2);

    map.set("k", 2);
    assert_eq!(runs.get(), 2);
}

/// Writing past the end of an array notifies `length` readers.
#[test]
fn array_add_beyond_length_triggers_length() {
    let arr = Reactive::from_json(json!(["foo"]));
    let reader = arr.clone();
    let (runs, _effect) = counting_effect(move || {
        reader.get("length");
    });

    arr.set(1, "bar");
    assert_eq!(runs.get(), 2);
    assert_eq!(arr.len(), 2);
}

/// Nested objects are wrapped lazily and tracked deeply.
#[test]
fn nested_objects_are_reactive() {
    let obj = Reactive::from_json(json!({ "user": { "name": "ada" } }));
    let reader = obj.clone();
    let seen = Rc::new(RefCell::new(String::new()));
    let sink = seen.clone();
    let (_runs, _effect) = counting_effect(move || {
        if let Value::Reactive(user) = reader.get("user") {
            *sink.borrow_mut() = user.get("name").to_string();
        }
    });

    if let Value::Reactive(user) = obj.get("user") {
        user.set("name", "grace");
    }
    assert_eq!(*seen.borrow(), "grace");
}

/// Readonly views drop writes without notifying anyone.
#[test]
fn readonly_rejects_writes() {
    let raw = Target::from_json(json!({ "foo": 1 }));
    let view = readonly(&raw);
    assert!(view.try_set("foo", 2).is_err());
    view.set("foo", 3);
    assert_eq!(raw.get_raw("foo").as_f64(), 1.0);
}

/// Effects iterating keys re-run when keys are added.
#[test]
fn key_iteration_sees_additions() {
    let obj = Reactive::from_json(json!({ "a": 1 }));
    let reader = obj.clone();
    let count = Rc::new(Cell::new(0));
    let sink = count.clone();
    let (_runs, _effect) = counting_effect(move || sink.set(reader.keys().len()));

    obj.set("b", 2);
    assert_eq!(count.get(), 2);

    obj.delete("a");
    assert_eq!(count.get(), 1);
}

/// Out-of-range lengths and indices are rejected before the array grows,
/// and no reader of `length` is notified.
#[test]
fn oversized_array_writes_are_rejected() {
    let arr = Reactive::from_json(json!([1, 2, 3]));
    let reader = arr.clone();
    let (runs, _effect) = counting_effect(move || {
        reader.len();
    });

    assert!(matches!(
        arr.try_set("length", 1.7e16),
        Err(ReactiveError::InvalidLength { .. })
    ));
    assert!(matches!(arr.try_set(1e300, 0), Err(ReactiveError::InvalidKey { .. })));
    arr.set("length", f64::INFINITY);

    assert_eq!(arr.len(), 3);
    assert_eq!(runs.get(), 1);
}

/// Handles returned by `effect` own it: dropping one stops the reactions.
#[test]
fn dropping_effect_handle_stops_it() {
    let obj = Reactive::from_json(json!({ "n": 0 }));
    let reader = obj.clone();
    let (runs, handle) = counting_effect(move || {
        reader.get("n");
    });
    obj.set("n", 1);
    assert_eq!(runs.get(), 2);

    drop(handle);
    obj.set("n", 2);
    assert_eq!(runs.get(), 2);
}
