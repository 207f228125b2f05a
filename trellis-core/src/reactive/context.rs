//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. Property
//! reads inside a running effect have no handle to "who is reading", so the
//! store asks this module instead.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing effect.
//! When an effect runs, it is pushed onto the stack; when it completes, it is
//! popped. The top of the stack is the active subscriber. Nested effects
//! therefore never corrupt the tracking of the effect that created them.
//!
//! The module also owns tracking suspension. Mutating array methods read
//! `length` internally, and that read must not become a dependency of the
//! effect that called them. Suspension is a depth counter so nested
//! suspended calls restore correctly, and every effect run starts with
//! tracking enabled and restores the outer suspension when it finishes.

use std::cell::{Cell, RefCell};

use super::effect::EffectRef;
use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
    static PAUSE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    effect: EffectRef,
    /// Suspension depth of the caller, restored when this entry is popped.
    saved_pause: usize,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the effect body panics.
pub(crate) struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given effect.
    pub(crate) fn enter(effect: &EffectRef) -> Self {
        let saved_pause = PAUSE_DEPTH.with(|depth| depth.replace(0));
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                effect: effect.clone(),
                saved_pause,
            });
        });

        Self {
            subscriber_id: effect.id(),
        }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the active effect, if any.
    pub(crate) fn current() -> Option<EffectRef> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.effect.clone()))
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.effect.id()))
    }

    /// Whether the given subscriber is the active one.
    pub(crate) fn is_current(id: SubscriberId) -> bool {
        Self::current_subscriber() == Some(id)
    }

    /// Whether reads should currently be recorded.
    pub fn should_track() -> bool {
        PAUSE_DEPTH.with(|depth| depth.get() == 0)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.effect.id(),
                self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id,
                entry.effect.id()
            );
            PAUSE_DEPTH.with(|depth| depth.set(entry.saved_pause));
        }
    }
}

/// Suspends dependency tracking until dropped.
///
/// Guards nest: tracking resumes only when the outermost guard is dropped.
pub struct TrackingPause {
    _private: (),
}

impl TrackingPause {
    pub fn new() -> Self {
        PAUSE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self { _private: () }
    }
}

impl Default for TrackingPause {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TrackingPause {
    fn drop(&mut self) {
        PAUSE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run `f` without recording any dependency.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _pause = TrackingPause::new();
    f()
}
