//! Reactive Runtime
//!
//! The runtime owns the dependency store: a two-level map from observed
//! target to property key to the set of effects that read it.
//!
//! # How It Works
//!
//! 1. When a tracked read happens inside a running effect, [`Runtime::track`]
//!    inserts the effect into the `(target, key)` set and records that set on
//!    the effect so it can remove itself before its next run.
//!
//! 2. When a write changes a value, [`Runtime::trigger`] collects the effects
//!    of the written key plus the fan-out keys implied by the kind of change
//!    (new keys invalidate enumeration, array truncation invalidates removed
//!    indices, and so on) and schedules them.
//!
//! 3. Trigger works on a snapshot of the collected effects. A scheduled
//!    effect cleans up and re-registers itself in the very sets being
//!    walked, so walking the live sets would be unsound.
//!
//! # Lifetime
//!
//! The store is keyed by [`TargetId`], never by a strong handle, and holds
//! effects weakly. When an observed target is dropped it calls
//! [`Runtime::forget`], which removes its entry. The store therefore never
//! keeps an unreferenced target alive, and an effect lives exactly as long as
//! the handle its creator keeps.
//!
//! # Thread Safety
//!
//! Everything here is thread-local. The model is a single logical thread of
//! control; targets and effects are `!Send`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::effect::{EffectInner, EffectRef};
use super::subscriber::{SubscriberId, TargetId};
use super::target::TargetKind;
use super::value::Value;

/// The set of effects subscribed to one `(target, key)` pair, in
/// registration order.
///
/// Effects are held weakly: an effect lives as long as its handle does, and
/// the store never extends that.
pub(crate) type Dep = RefCell<IndexMap<SubscriberId, Weak<EffectInner>>>;

type KeyDeps = IndexMap<TrackKey, Rc<Dep>>;

thread_local! {
    static STORE: RefCell<HashMap<TargetId, KeyDeps>> = RefCell::new(HashMap::new());
    // Targets dropped while the store was borrowed.
    static PENDING_FORGET: RefCell<Vec<TargetId>> = const { RefCell::new(Vec::new()) };
}

/// A key inside one target's dependency map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackKey {
    /// A named property of a record (also the `value` field of refs and
    /// computed values).
    Name(Rc<str>),
    /// An array index.
    Index(usize),
    /// The array `length` property.
    Length,
    /// A map key or set member.
    Entry(Value),
    /// Enumeration of all keys, and value iteration of collections.
    Iterate,
    /// Key-only iteration of a map.
    MapKeyIterate,
}

impl TrackKey {
    pub fn name(name: &str) -> Self {
        Self::Name(Rc::from(name))
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
            Self::Length => f.write_str("length"),
            Self::Entry(value) => write!(f, "[{value}]"),
            Self::Iterate => f.write_str("<iterate>"),
            Self::MapKeyIterate => f.write_str("<map-key-iterate>"),
        }
    }
}

/// The kind of change passed to [`Runtime::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing key got a different value.
    Set,
    /// A key that did not exist appeared.
    Add,
    /// An existing key was removed.
    Delete,
    /// A collection was emptied.
    Clear,
}

/// The global dependency store.
pub struct Runtime;

impl Runtime {
    /// Record that the active effect depends on `(target, key)`.
    ///
    /// No-op outside an effect or while tracking is suspended.
    pub fn track(target: TargetId, key: TrackKey) {
        if !ReactiveContext::should_track() {
            return;
        }
        let Some(effect) = ReactiveContext::current() else {
            return;
        };
        drain_pending();

        tracing::trace!(%target, %key, subscriber = %effect.id(), "track");
        let dep = STORE.with(|store| {
            let mut store = store.borrow_mut();
            Rc::clone(
                store
                    .entry(target)
                    .or_default()
                    .entry(key)
                    .or_insert_with(|| Rc::new(RefCell::new(IndexMap::new()))),
            )
        });

        let inserted = {
            let mut subscribers = dep.borrow_mut();
            if subscribers.contains_key(&effect.id()) {
                false
            } else {
                subscribers.insert(effect.id(), Rc::downgrade(&effect));
                true
            }
        };
        if inserted {
            effect.record_dep(&dep);
        }
    }

    /// Schedule every effect affected by a change of `(target, key)`.
    ///
    /// `new_len` is the new array length when `key` is [`TrackKey::Length`].
    pub fn trigger(
        target: TargetId,
        kind: TargetKind,
        key: TrackKey,
        op: TriggerOp,
        new_len: Option<usize>,
    ) {
        drain_pending();
        let active = ReactiveContext::current_subscriber();
        let mut to_run: IndexMap<SubscriberId, EffectRef> = IndexMap::new();

        STORE.with(|store| {
            let store = store.borrow();
            let Some(deps) = store.get(&target) else {
                return;
            };

            let mut collect = |dep: Option<&Rc<Dep>>| {
                if let Some(dep) = dep {
                    for (id, effect) in dep.borrow().iter() {
                        if Some(*id) == active || to_run.contains_key(id) {
                            continue;
                        }
                        if let Some(effect) = effect.upgrade() {
                            to_run.insert(*id, effect);
                        }
                    }
                }
            };

            if op == TriggerOp::Clear {
                for dep in deps.values() {
                    collect(Some(dep));
                }
                return;
            }

            collect(deps.get(&key));

            if kind == TargetKind::Array && key == TrackKey::Length {
                let len = new_len.unwrap_or(0);
                for (tracked, dep) in deps.iter() {
                    if matches!(tracked, TrackKey::Index(index) if *index >= len) {
                        collect(Some(dep));
                    }
                }
            }

            if op == TriggerOp::Add && kind == TargetKind::Array {
                collect(deps.get(&TrackKey::Length));
            }

            if matches!(op, TriggerOp::Add | TriggerOp::Delete)
                || (op == TriggerOp::Set && kind == TargetKind::Map)
            {
                collect(deps.get(&TrackKey::Iterate));
            }

            if kind == TargetKind::Map && matches!(op, TriggerOp::Add | TriggerOp::Delete) {
                collect(deps.get(&TrackKey::MapKeyIterate));
            }
        });

        if to_run.is_empty() {
            return;
        }
        tracing::trace!(%target, %key, ?op, count = to_run.len(), "trigger");
        for effect in to_run.into_values() {
            effect.schedule();
        }
    }

    /// Drop every dependency entry of `target`.
    pub(crate) fn forget(target: TargetId) {
        let removed = STORE.try_with(|store| match store.try_borrow_mut() {
            Ok(mut store) => Some(store.remove(&target)),
            Err(_) => None,
        });
        match removed {
            // The entry is dropped here, after the store borrow ended.
            Ok(Some(entry)) => drop(entry),
            Ok(None) => {
                let _ = PENDING_FORGET.try_with(|pending| pending.borrow_mut().push(target));
            }
            Err(_) => {}
        }
    }

    /// Number of effects subscribed to `(target, key)`.
    pub fn subscriber_count(target: TargetId, key: &TrackKey) -> usize {
        STORE.with(|store| {
            store
                .borrow()
                .get(&target)
                .and_then(|deps| deps.get(key))
                .map(|dep| dep.borrow().values().filter(|e| e.strong_count() > 0).count())
                .unwrap_or(0)
        })
    }

    /// Whether the store holds an entry for `target`.
    pub fn is_tracked(target: TargetId) -> bool {
        drain_pending();
        STORE.with(|store| store.borrow().contains_key(&target))
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active() && ReactiveContext::should_track()
    }
}

fn drain_pending() {
    let pending = PENDING_FORGET.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
    if pending.is_empty() {
        return;
    }
    let removed: Vec<KeyDeps> = STORE.with(|store| {
        let mut store = store.borrow_mut();
        pending.iter().filter_map(|id| store.remove(id)).collect()
    });
    drop(removed);
}
