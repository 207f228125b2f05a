//! Watchers
//!
//! A watcher runs a callback with the new and old value of a source every
//! time the source changes. The source is evaluated by a lazy effect whose
//! scheduler runs the watcher job instead of re-running the effect directly.
//!
//! Watching a wrapper traverses it completely, so writes to nested fields
//! are seen. Traversal remembers visited targets and terminates on cycles.

use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Deserialize;

use crate::scheduler::queue_microtask;

use super::effect::{effect, EffectOptions, ReactiveEffect};
use super::proxy::Reactive;
use super::refs::Ref;
use super::subscriber::TargetId;
use super::value::Value;

/// When the watcher job runs relative to the triggering write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flush {
    /// Inside the write.
    #[default]
    Sync,
    /// At the next microtask checkpoint.
    Post,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Run the callback once at registration.
    pub immediate: bool,
    pub flush: Flush,
}

impl WatchOptions {
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            ..Self::default()
        }
    }

    pub fn post() -> Self {
        Self {
            flush: Flush::Post,
            ..Self::default()
        }
    }
}

/// What a watcher observes.
pub enum WatchSource {
    /// A getter, tracked exactly as written.
    Getter(Box<dyn FnMut() -> Value>),
    /// A wrapper, traversed deeply.
    Reactive(Reactive),
    Ref(Ref),
}

impl WatchSource {
    pub fn getter(f: impl FnMut() -> Value + 'static) -> Self {
        Self::Getter(Box::new(f))
    }

    fn into_getter(self) -> Box<dyn FnMut() -> Value> {
        match self {
            Self::Getter(getter) => getter,
            Self::Reactive(source) => Box::new(move || {
                let value = Value::Reactive(source.clone());
                traverse(&value, &mut HashSet::new());
                value
            }),
            Self::Ref(source) => Box::new(move || source.get()),
        }
    }
}

impl From<Reactive> for WatchSource {
    fn from(source: Reactive) -> Self {
        Self::Reactive(source)
    }
}

impl From<&Reactive> for WatchSource {
    fn from(source: &Reactive) -> Self {
        Self::Reactive(source.clone())
    }
}

impl From<Ref> for WatchSource {
    fn from(source: Ref) -> Self {
        Self::Ref(source)
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Getter(_) => f.write_str("Getter"),
            Self::Reactive(r) => f.debug_tuple("Reactive").field(r).finish(),
            Self::Ref(r) => f.debug_tuple("Ref").field(r).finish(),
        }
    }
}

/// Read every nested field of `value` so each becomes a dependency.
pub fn traverse(value: &Value, seen: &mut HashSet<TargetId>) {
    match value {
        Value::Reactive(source) => {
            if !seen.insert(source.id()) {
                return;
            }
            for (key, nested) in source.entries() {
                traverse(&key, seen);
                traverse(&nested, seen);
            }
        }
        Value::Ref(source) => traverse(&source.get(), seen),
        _ => {}
    }
}

type Cleanup = Box<dyn FnOnce()>;
type Callback = Box<dyn FnMut(&Value, &Value, &OnInvalidate)>;

/// Registers a cleanup that runs before the next callback invocation, or
/// when the watcher stops.
pub struct OnInvalidate {
    slot: Rc<RefCell<Option<Cleanup>>>,
}

impl OnInvalidate {
    pub fn register(&self, cleanup: impl FnOnce() + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(cleanup));
    }
}

struct WatchInner {
    effect: OnceCell<ReactiveEffect<Value>>,
    old: RefCell<Value>,
    cleanup: Rc<RefCell<Option<Cleanup>>>,
    callback: RefCell<Callback>,
}

impl WatchInner {
    fn job(&self) {
        let Some(runner) = self.effect.get() else {
            return;
        };
        if !runner.is_active() {
            return;
        }
        let Some(new) = runner.run() else {
            return;
        };

        let pending = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = pending {
            cleanup();
        }

        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            tracing::trace!("watch callback re-entered; skipped");
            return;
        };
        let old = self.old.replace(new.clone());
        let on_invalidate = OnInvalidate {
            slot: Rc::clone(&self.cleanup),
        };
        (callback)(&new, &old, &on_invalidate);
    }
}

/// Stops a watcher. Dropping the handle stops it too.
#[must_use = "the watcher stops when its handle is dropped"]
pub struct WatchHandle {
    inner: Rc<WatchInner>,
}

impl WatchHandle {
    pub fn stop(&self) {
        if let Some(runner) = self.inner.effect.get() {
            runner.stop();
        }
        let pending = self.inner.cleanup.borrow_mut().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.effect.get().is_some_and(|runner| runner.is_active())
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .field("old", &self.inner.old.borrow())
            .finish()
    }
}

/// Call `callback(new, old, on_invalidate)` whenever `source` changes.
pub fn watch<F>(source: impl Into<WatchSource>, callback: F, options: WatchOptions) -> WatchHandle
where
    F: FnMut(&Value, &Value, &OnInvalidate) + 'static,
{
    let inner = Rc::new(WatchInner {
        effect: OnceCell::new(),
        old: RefCell::new(Value::Undefined),
        cleanup: Rc::new(RefCell::new(None)),
        callback: RefCell::new(Box::new(callback)),
    });

    let weak: Weak<WatchInner> = Rc::downgrade(&inner);
    let flush = options.flush;
    let runner = effect(
        source.into().into_getter(),
        EffectOptions::lazy().with_scheduler(move |_| match flush {
            Flush::Sync => {
                if let Some(inner) = weak.upgrade() {
                    inner.job();
                }
            }
            Flush::Post => {
                let weak = weak.clone();
                queue_microtask(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.job();
                    }
                });
            }
        }),
    );
    let _ = inner.effect.set(runner);

    if options.immediate {
        inner.job();
    } else if let Some(runner) = inner.effect.get() {
        let initial = runner.run().unwrap_or_default();
        *inner.old.borrow_mut() = initial;
    }

    WatchHandle { inner }
}

impl Drop for WatchInner {
    fn drop(&mut self) {
        if let Some(runner) = self.effect.get() {
            runner.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::scheduler::run_microtasks;

    #[test]
    fn getter_source_reports_new_and_old() {
        let obj = Reactive::from_json(json!({ "foo": 1 }));
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (reader, log) = (obj.clone(), calls.clone());
        let _watcher = watch(
            WatchSource::getter(move || reader.get("foo")),
            move |new, old, _| log.borrow_mut().push((new.as_f64(), old.as_f64())),
            WatchOptions::default(),
        );

        obj.set("foo", 2);
        assert_eq!(*calls.borrow(), vec![(2.0, 1.0)]);
    }

    #[test]
    fn deep_source_sees_nested_writes() {
        let obj = Reactive::from_json(json!({ "nested": { "deep": 1 } }));
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let _watcher = watch(&obj, move |_, _, _| counter.set(counter.get() + 1), WatchOptions::default());

        if let Value::Reactive(nested) = obj.get("nested") {
            nested.set("deep", 2);
        }
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn traversal_terminates_on_cycles() {
        let obj = Reactive::from_json(json!({}));
        obj.set("me", &obj);
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let _watcher = watch(&obj, move |_, _, _| counter.set(counter.get() + 1), WatchOptions::default());
        obj.set("other", 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn post_flush_defers_to_microtask() {
        let obj = Reactive::from_json(json!({ "foo": 1 }));
        let count = Rc::new(Cell::new(0));
        let (reader, counter) = (obj.clone(), count.clone());
        let _watcher = watch(
            WatchSource::getter(move || reader.get("foo")),
            move |_, _, _| counter.set(counter.get() + 1),
            WatchOptions::post(),
        );

        obj.set("foo", 2);
        assert_eq!(count.get(), 0);
        run_microtasks();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn invalidation_runs_before_next_callback() {
        let obj = Reactive::from_json(json!({ "foo": 1 }));
        let expired = Rc::new(RefCell::new(Vec::new()));
        let (reader, flags) = (obj.clone(), expired.clone());
        let _watcher = watch(
            WatchSource::getter(move || reader.get("foo")),
            move |_, _, on_invalidate| {
                let flag = Rc::new(Cell::new(false));
                flags.borrow_mut().push(flag.clone());
                on_invalidate.register(move || flag.set(true));
            },
            WatchOptions::default(),
        );

        obj.set("foo", 2);
        obj.set("foo", 3);
        let expired = expired.borrow();
        assert!(expired[0].get());
        assert!(!expired[1].get());
    }

    #[test]
    fn stopped_watcher_is_silent() {
        let obj = Reactive::from_json(json!({ "foo": 1 }));
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let watcher = watch(&obj, move |_, _, _| counter.set(counter.get() + 1), WatchOptions::default());
        watcher.stop();
        assert!(!watcher.is_active());
        obj.set("foo", 2);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn options_deserialize() {
        let options: WatchOptions = serde_json::from_str(r#"{ "flush": "post" }"#).unwrap();
        assert_eq!(options.flush, Flush::Post);
        assert!(!options.immediate);
    }
}
