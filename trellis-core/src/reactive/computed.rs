//! Computed Values
//!
//! A computed value is a cached derived value that re-evaluates only when one
//! of its dependencies changes.
//!
//! # How Computed Values Work
//!
//! 1. The getter is wrapped in a lazy effect. Nothing runs on creation.
//!
//! 2. On the first read the effect runs, the result is cached and the value
//!    is marked clean.
//!
//! 3. When a dependency changes, the effect's scheduler only marks the value
//!    dirty. The getter does not run.
//!
//! 4. The next read re-evaluates and caches again.
//!
//! # Outer effects
//!
//! The inner effect's dependencies are invisible to an effect that merely
//! reads the computed value. So every read tracks the computed's own
//! `value` key, and marking dirty triggers that key.
//!
//! This "lazy" approach avoids unnecessary recomputation: a computed value
//! that is never read again stays dirty and costs nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::effect::{effect, EffectOptions, ReactiveEffect};
use super::runtime::{Runtime, TrackKey, TriggerOp};
use super::subscriber::TargetId;
use super::target::TargetKind;

struct ComputedInner<T: 'static> {
    id: TargetId,
    effect: ReactiveEffect<T>,
    value: RefCell<Option<T>>,
    dirty: Rc<Cell<bool>>,
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
        Runtime::forget(self.id);
    }
}

/// A cached derived value.
///
/// Cloning shares the cache.
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

/// Create a computed value from `getter`.
///
/// The getter is not run until the first [`Computed::get`].
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: FnMut() -> T + 'static,
{
    let id = TargetId::next();
    let dirty = Rc::new(Cell::new(true));
    let flag = Rc::clone(&dirty);

    let runner = effect(
        getter,
        EffectOptions::lazy().with_scheduler(move |_| {
            if !flag.replace(true) {
                Runtime::trigger(id, TargetKind::Object, value_key(), TriggerOp::Set, None);
            }
        }),
    );

    Computed {
        inner: Rc::new(ComputedInner {
            id,
            effect: runner,
            value: RefCell::new(None),
            dirty,
        }),
    }
}

fn value_key() -> TrackKey {
    TrackKey::name("value")
}

impl<T: Clone + 'static> Computed<T> {
    /// Read the value, re-evaluating first if a dependency changed.
    ///
    /// Returns `None` only when the getter reads its own computed value
    /// before the first evaluation finished.
    pub fn try_get(&self) -> Option<T> {
        let inner = &self.inner;
        if inner.dirty.get() {
            if let Some(value) = inner.effect.run() {
                *inner.value.borrow_mut() = Some(value);
                inner.dirty.set(false);
            }
        }
        Runtime::track(inner.id, value_key());
        inner.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Number of times the getter has run.
    pub fn evaluations(&self) -> usize {
        self.inner.effect.run_count()
    }
}

impl<T: Clone + Default + 'static> Computed<T> {
    /// Read the value, re-evaluating first if a dependency changed.
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|| {
            tracing::warn!(computed = %self.inner.id, "computed value read during its own evaluation");
            T::default()
        })
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .field("dirty", &self.inner.dirty.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
