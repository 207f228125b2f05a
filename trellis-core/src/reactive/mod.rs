//! Reactive Primitives
//!
//! This module implements the reactivity engine: observed structures,
//! effects, computed values, refs and watchers.
//!
//! # Concepts
//!
//! ## Observed structures
//!
//! A [`Target`] holds plain data: a record, an array, a map or a set. A
//! [`Reactive`] wrapper intercepts every read and write of it. Reads inside a
//! running effect are recorded as dependencies; writes that change something
//! re-run the effects that read it.
//!
//! ## Effects
//!
//! An effect is a side-effecting computation that runs whenever its
//! dependencies change. Each run rebuilds the dependency set from scratch,
//! so dependencies behind a branch that is no longer taken disappear.
//!
//! ## Computed values
//!
//! A computed value is a derived value that caches its result and
//! re-evaluates only when read after one of its dependencies changed.
//!
//! ## Refs and watchers
//!
//! A [`Ref`] is a single observed slot. A watcher calls back with the new and
//! old value of a source whenever it changes.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a wrapper is read, we check if there is an
//! active tracking context and, if so, register the dependency in the
//! thread-local dependency store.

mod collections;
mod computed;
mod context;
mod effect;
mod proxy;
mod refs;
mod runtime;
mod subscriber;
mod target;
mod value;
mod watch;

pub use computed::{computed, Computed};
pub use context::{untracked, TrackingPause};
pub use effect::{effect, EffectOptions, ReactiveEffect, Scheduler, Subscriber};
pub use proxy::{
    is_reactive, is_readonly, reactive, readonly, shallow_reactive, shallow_readonly, to_raw,
    ProxyFlags, Reactive,
};
pub use refs::{is_ref, proxy_refs, shallow_ref, to_ref, to_refs, unref, ProxyRefs, Ref};
pub use runtime::{Runtime, TrackKey, TriggerOp};
pub use subscriber::{SubscriberId, TargetId};
pub use target::{Target, TargetData, TargetKind};
pub use value::{Callback, Value};
pub use watch::{traverse, watch, Flush, OnInvalidate, WatchHandle, WatchOptions, WatchSource};
