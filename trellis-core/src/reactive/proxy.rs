//! Observing Wrappers
//!
//! A [`Reactive`] wraps a [`Target`] and is the only way to read or write it
//! with dependency tracking. Every accessor goes through the wrapper: reads
//! call [`Runtime::track`], writes classify the change and call
//! [`Runtime::trigger`].
//!
//! # Modes
//!
//! | mode               | tracks reads | nested structures      | writes   |
//! |--------------------|--------------|------------------------|----------|
//! | `reactive`         | yes          | wrapped deeply         | allowed  |
//! | `shallow_reactive` | yes          | returned raw           | allowed  |
//! | `readonly`         | no           | wrapped as readonly    | rejected |
//! | `shallow_readonly` | no           | returned raw           | rejected |
//!
//! Wrappers are cached per target and mode, so wrapping the same target
//! twice yields the same wrapper and identity comparisons stay meaningful.
//!
//! # Prototypes
//!
//! A record target may inherit from another wrapper. Reads of missing keys
//! fall through to it. Writes always land on the receiving record, and only
//! the receiver triggers: the prototype sees the write pass through but its
//! target is not the receiver, so it stays silent.

use std::collections::TryReserveError;
use std::fmt;
use std::rc::Rc;

use crate::error::{ReactiveError, Result};

use super::context::TrackingPause;
use super::runtime::{Runtime, TrackKey, TriggerOp};
use super::subscriber::TargetId;
use super::target::{
    array_key, object_key, ArrayKey, Target, TargetData, TargetKind, MAX_ARRAY_LENGTH,
};
use super::value::Value;

/// Wrapper mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProxyFlags {
    pub shallow: bool,
    pub readonly: bool,
}

impl ProxyFlags {
    pub const DEEP: Self = Self {
        shallow: false,
        readonly: false,
    };
    pub const SHALLOW: Self = Self {
        shallow: true,
        readonly: false,
    };
    pub const READONLY: Self = Self {
        shallow: false,
        readonly: true,
    };
    pub const SHALLOW_READONLY: Self = Self {
        shallow: true,
        readonly: true,
    };

    /// Index of this mode in a target's wrapper cache.
    pub(crate) fn slot(self) -> usize {
        usize::from(self.shallow) | (usize::from(self.readonly) << 1)
    }
}

pub(crate) struct ProxyInner {
    target: Target,
    flags: ProxyFlags,
}

/// An observed structure.
///
/// Cloning is cheap and yields the same wrapper.
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ProxyInner>,
}

fn wrap(target: &Target, flags: ProxyFlags) -> Reactive {
    if let Some(inner) = target.cached_proxy(flags) {
        return Reactive { inner };
    }
    let inner = Rc::new(ProxyInner {
        target: target.clone(),
        flags,
    });
    target.cache_proxy(flags, &inner);
    tracing::trace!(target = %target.id(), ?flags, "wrap");
    Reactive { inner }
}

/// Deeply observe `target`.
pub fn reactive(target: &Target) -> Reactive {
    wrap(target, ProxyFlags::DEEP)
}

/// Observe only the top level of `target`.
pub fn shallow_reactive(target: &Target) -> Reactive {
    wrap(target, ProxyFlags::SHALLOW)
}

/// A deeply read-only view of `target`. Reads through it never track.
pub fn readonly(target: &Target) -> Reactive {
    wrap(target, ProxyFlags::READONLY)
}

pub fn shallow_readonly(target: &Target) -> Reactive {
    wrap(target, ProxyFlags::SHALLOW_READONLY)
}

/// Whether `value` is a writable wrapper.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Reactive(r) if !r.is_readonly())
}

pub fn is_readonly(value: &Value) -> bool {
    matches!(value, Value::Reactive(r) if r.is_readonly())
}

/// Strip any wrapper from `value`.
pub fn to_raw(value: &Value) -> Value {
    value.to_raw()
}

impl Reactive {
    /// Deeply observe a structure built from JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        reactive(&Target::from_json(json))
    }

    /// The raw structure behind the wrapper.
    pub fn raw(&self) -> Target {
        self.inner.target.clone()
    }

    pub(crate) fn target(&self) -> &Target {
        &self.inner.target
    }

    pub fn flags(&self) -> ProxyFlags {
        self.inner.flags
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.flags.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.flags.shallow
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.target.kind()
    }

    /// Identity of the observed target.
    pub fn id(&self) -> TargetId {
        self.inner.target.id()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(super) fn track(&self, key: TrackKey) {
        if !self.inner.flags.readonly {
            Runtime::track(self.id(), key);
        }
    }

    pub(super) fn trigger(&self, key: TrackKey, op: TriggerOp, new_len: Option<usize>) {
        Runtime::trigger(self.id(), self.kind(), key, op, new_len);
    }

    /// Wrap a value read out of this structure according to the mode.
    pub(super) fn wrap_nested(&self, value: Value) -> Value {
        let flags = self.inner.flags;
        if flags.shallow {
            return value;
        }
        match value {
            Value::Object(target) if flags.readonly => Value::Reactive(readonly(&target)),
            Value::Object(target) => Value::Reactive(reactive(&target)),
            Value::Reactive(r) if flags.readonly && !r.is_readonly() => {
                Value::Reactive(readonly(r.target()))
            }
            other => other,
        }
    }

    /// Deep wrappers store raw data so one structure never holds another's
    /// wrapper.
    pub(super) fn store_value(&self, value: Value) -> Value {
        if self.inner.flags.shallow {
            value
        } else {
            value.to_raw()
        }
    }

    fn check_writable(&self, key: &Value) -> Result<()> {
        if self.is_readonly() {
            Err(ReactiveError::ReadOnly {
                key: key.to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn raw_item(&self, index: usize) -> Option<Value> {
        self.target().with_data(|data| match data {
            TargetData::Array(items) => items.get(index).cloned(),
            _ => None,
        })
    }

    fn raw_len(&self) -> usize {
        self.target().len_raw()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read `key`.
    ///
    /// On maps this is the entry for `key`; on sets it reports membership.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        let key = key.into();
        match self.kind() {
            TargetKind::Object => self.get_property(object_key(&key)),
            TargetKind::Array => match array_key(&key) {
                ArrayKey::Index(index) => {
                    self.track(TrackKey::Index(index));
                    let value = self.raw_item(index).unwrap_or_default();
                    self.wrap_nested(value)
                }
                ArrayKey::Length => Value::from(self.len()),
                ArrayKey::Other(_) => Value::Undefined,
            },
            TargetKind::Map => self.map_get(key),
            TargetKind::Set => Value::Bool(self.collection_has(key)),
        }
    }

    fn get_property(&self, name: Rc<str>) -> Value {
        self.track(TrackKey::Name(Rc::clone(&name)));
        let own = self.target().with_data(|data| match data {
            TargetData::Object(map) => map.get(&*name).cloned(),
            _ => None,
        });
        let value = match own {
            Some(value) => value,
            None => match self.target().prototype() {
                Some(proto) => proto.get(name),
                None => Value::Undefined,
            },
        };
        self.wrap_nested(value)
    }

    /// Whether `key` exists, tracked like a read.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        match self.kind() {
            TargetKind::Object => {
                let name = object_key(&key);
                self.track(TrackKey::Name(Rc::clone(&name)));
                self.target().has_own(&name)
                    || self
                        .target()
                        .prototype()
                        .is_some_and(|proto| proto.has(name))
            }
            TargetKind::Array => match array_key(&key) {
                ArrayKey::Index(index) => {
                    self.track(TrackKey::Index(index));
                    index < self.raw_len()
                }
                ArrayKey::Length => true,
                ArrayKey::Other(_) => false,
            },
            TargetKind::Map | TargetKind::Set => self.collection_has(key),
        }
    }

    /// Own keys in insertion order. Records track key enumeration, arrays
    /// track `length`.
    pub fn keys(&self) -> Vec<Value> {
        match self.kind() {
            TargetKind::Object => {
                self.track(TrackKey::Iterate);
                self.target().with_data(|data| match data {
                    TargetData::Object(map) => {
                        map.keys().map(|k| Value::String(Rc::clone(k))).collect()
                    }
                    _ => Vec::new(),
                })
            }
            TargetKind::Array => {
                self.track(TrackKey::Length);
                (0..self.raw_len()).map(Value::from).collect()
            }
            TargetKind::Map | TargetKind::Set => self.collection_keys(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        match self.kind() {
            TargetKind::Object => {
                self.track(TrackKey::Iterate);
                self.raw_len()
            }
            TargetKind::Array => {
                self.track(TrackKey::Length);
                self.raw_len()
            }
            TargetKind::Map | TargetKind::Set => self.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values in order, each read through [`Reactive::get`].
    pub fn values(&self) -> Vec<Value> {
        match self.kind() {
            TargetKind::Object | TargetKind::Array => {
                self.keys().into_iter().map(|key| self.get(key)).collect()
            }
            TargetKind::Map | TargetKind::Set => self.collection_values(),
        }
    }

    /// `(key, value)` pairs in order. Set entries pair each member with
    /// itself.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match self.kind() {
            TargetKind::Object | TargetKind::Array => self
                .keys()
                .into_iter()
                .map(|key| {
                    let value = self.get(key.clone());
                    (key, value)
                })
                .collect(),
            TargetKind::Map | TargetKind::Set => self.collection_entries(),
        }
    }

    /// Call `f(value, key)` for every entry.
    pub fn for_each(&self, mut f: impl FnMut(Value, Value)) {
        for (key, value) in self.entries() {
            f(value, key);
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write `key`. Rejected writes are logged and dropped.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        if let Err(err) = self.try_set(key, value) {
            tracing::warn!(target = %self.id(), "{err}; write dropped");
        }
    }

    pub fn try_set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        self.check_writable(&key)?;
        let value = self.store_value(value.into());
        match self.kind() {
            TargetKind::Object => self.set_property(object_key(&key), value, self.target()),
            TargetKind::Array => self.set_array(array_key(&key), value),
            TargetKind::Map => {
                self.map_set(key, value);
                Ok(())
            }
            TargetKind::Set => Err(ReactiveError::Unsupported {
                op: "set",
                kind: TargetKind::Set,
            }),
        }
    }

    /// Write a record property on behalf of `receiver`.
    ///
    /// Keys the receiver does not own are handed to the prototype, which
    /// stores them on the receiver. Only the wrapper whose target is the
    /// receiver triggers.
    pub(crate) fn set_property(&self, name: Rc<str>, value: Value, receiver: &Target) -> Result<()> {
        if self.is_readonly() {
            return Err(ReactiveError::ReadOnly {
                key: name.to_string(),
            });
        }
        let target = self.target();
        let had_key = target.has_own(&name);
        let old = target.lookup_chain(&name).unwrap_or_default();

        match target.prototype() {
            Some(proto) if !had_key => proto.set_property(Rc::clone(&name), value.clone(), receiver)?,
            _ => receiver.with_data_mut(|data| {
                if let TargetData::Object(map) = data {
                    map.insert(Rc::clone(&name), value.clone());
                }
            }),
        }

        if target.ptr_eq(receiver) && old != value {
            let op = if had_key { TriggerOp::Set } else { TriggerOp::Add };
            self.trigger(TrackKey::Name(name), op, None);
        }
        Ok(())
    }

    fn set_array(&self, key: ArrayKey, value: Value) -> Result<()> {
        match key {
            ArrayKey::Index(index) => {
                let (had_key, old) = self.target().with_data_mut(|data| -> Result<_> {
                    let TargetData::Array(items) = data else {
                        return Ok((true, value.clone()));
                    };
                    let had_key = index < items.len();
                    if !had_key {
                        grow(items, index + 1)
                            .map_err(|_| ReactiveError::InvalidKey { key: index.to_string() })?;
                    }
                    Ok((had_key, std::mem::replace(&mut items[index], value.clone())))
                })?;
                // A slot grown with the value it already implied changes nothing.
                if old != value {
                    let op = if had_key { TriggerOp::Set } else { TriggerOp::Add };
                    self.trigger(TrackKey::Index(index), op, None);
                }
                Ok(())
            }
            ArrayKey::Length => {
                let len = value.as_f64();
                let invalid = || ReactiveError::InvalidLength { length: value.to_string() };
                if !(len >= 0.0 && len.fract() == 0.0 && len <= MAX_ARRAY_LENGTH as f64) {
                    return Err(invalid());
                }
                let new_len = len as usize;
                let changed = self.target().with_data_mut(|data| -> Result<bool> {
                    match data {
                        TargetData::Array(items) if items.len() != new_len => {
                            grow(items, new_len).map_err(|_| invalid())?;
                            items.truncate(new_len);
                            Ok(true)
                        }
                        _ => Ok(false),
                    }
                })?;
                if changed {
                    self.trigger(TrackKey::Length, TriggerOp::Set, Some(new_len));
                }
                Ok(())
            }
            ArrayKey::Other(key) => Err(ReactiveError::InvalidKey { key }),
        }
    }

    /// Remove `key`. Returns whether it existed.
    pub fn delete(&self, key: impl Into<Value>) -> bool {
        match self.try_delete(key) {
            Ok(existed) => existed,
            Err(err) => {
                tracing::warn!(target = %self.id(), "{err}; delete dropped");
                false
            }
        }
    }

    pub fn try_delete(&self, key: impl Into<Value>) -> Result<bool> {
        let key = key.into();
        self.check_writable(&key)?;
        match self.kind() {
            TargetKind::Object => {
                let name = object_key(&key);
                let removed = self.target().with_data_mut(|data| match data {
                    TargetData::Object(map) => map.shift_remove(&*name).is_some(),
                    _ => false,
                });
                if removed {
                    self.trigger(TrackKey::Name(name), TriggerOp::Delete, None);
                }
                Ok(removed)
            }
            TargetKind::Array => match array_key(&key) {
                ArrayKey::Index(index) => {
                    let existed = self.target().with_data_mut(|data| match data {
                        TargetData::Array(items) if index < items.len() => {
                            items[index] = Value::Undefined;
                            true
                        }
                        _ => false,
                    });
                    if existed {
                        self.trigger(TrackKey::Index(index), TriggerOp::Delete, None);
                    }
                    Ok(existed)
                }
                _ => Err(ReactiveError::InvalidKey {
                    key: key.to_string(),
                }),
            },
            TargetKind::Map | TargetKind::Set => Ok(self.collection_delete(key)),
        }
    }

    /// Add a member to a set.
    pub fn add(&self, value: impl Into<Value>) {
        if let Err(err) = self.try_add(value) {
            tracing::warn!(target = %self.id(), "{err}; add dropped");
        }
    }

    pub fn try_add(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.check_writable(&value)?;
        match self.kind() {
            TargetKind::Set => {
                self.collection_add(value);
                Ok(())
            }
            kind => Err(ReactiveError::Unsupported { op: "add", kind }),
        }
    }

    /// Empty a map or set.
    pub fn clear(&self) {
        if let Err(err) = self.try_clear() {
            tracing::warn!(target = %self.id(), "{err}; clear dropped");
        }
    }

    pub fn try_clear(&self) -> Result<()> {
        if self.is_readonly() {
            return Err(ReactiveError::ReadOnly {
                key: "<clear>".to_string(),
            });
        }
        match self.kind() {
            TargetKind::Map | TargetKind::Set => {
                self.collection_clear();
                Ok(())
            }
            kind => Err(ReactiveError::Unsupported { op: "clear", kind }),
        }
    }

    // ------------------------------------------------------------------
    // Array methods
    // ------------------------------------------------------------------

    pub fn includes(&self, needle: impl Into<Value>) -> bool {
        self.search(&needle.into(), false, true).is_some()
    }

    pub fn index_of(&self, needle: impl Into<Value>) -> Option<usize> {
        self.search(&needle.into(), false, false)
    }

    pub fn last_index_of(&self, needle: impl Into<Value>) -> Option<usize> {
        self.search(&needle.into(), true, false)
    }

    /// Search the wrapped elements first so wrappers compare equal, then the
    /// raw elements so raw needles still match.
    fn search(&self, needle: &Value, from_end: bool, nan_matches: bool) -> Option<usize> {
        if self.kind() != TargetKind::Array {
            return None;
        }
        let is_hit = |item: &Value| {
            item == needle && (nan_matches || !matches!(item, Value::Number(n) if n.is_nan()))
        };
        let find = |items: &[Value]| {
            if from_end {
                items.iter().rposition(|item| is_hit(item))
            } else {
                items.iter().position(|item| is_hit(item))
            }
        };

        let wrapped = self.values();
        find(&wrapped).or_else(|| {
            let raw = self.target().with_data(|data| match data {
                TargetData::Array(items) => items.clone(),
                _ => Vec::new(),
            });
            find(&raw)
        })
    }

    /// Run an array mutator with tracking suspended. Mutators read `length`
    /// internally and that read must not become a dependency of the caller.
    fn mutate<R: Default>(&self, op: &'static str, f: impl FnOnce() -> R) -> R {
        if self.kind() != TargetKind::Array {
            tracing::warn!(target = %self.id(), kind = %self.kind(), "`{op}` called on a non-array");
            return R::default();
        }
        if self.is_readonly() {
            tracing::warn!(target = %self.id(), "`{op}` on a read-only array dropped");
            return R::default();
        }
        let _pause = TrackingPause::new();
        f()
    }

    /// Append `value`, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate("push", || {
            let len = self.len();
            self.set(len, value);
            len + 1
        })
    }

    pub fn pop(&self) -> Value {
        self.mutate("pop", || {
            let len = self.len();
            if len == 0 {
                return Value::Undefined;
            }
            let last = self.get(len - 1);
            self.set("length", len - 1);
            last
        })
    }

    pub fn shift(&self) -> Value {
        self.mutate("shift", || {
            let len = self.len();
            if len == 0 {
                return Value::Undefined;
            }
            let first = self.get(0);
            for index in 1..len {
                let value = self.get(index);
                self.set(index - 1, value);
            }
            self.set("length", len - 1);
            first
        })
    }

    /// Prepend `values` in order, returning the new length.
    pub fn unshift<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> usize {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.mutate("unshift", || {
            let len = self.len();
            let count = values.len();
            for index in (0..len).rev() {
                let value = self.get(index);
                self.set(index + count, value);
            }
            for (index, value) in values.into_iter().enumerate() {
                self.set(index, value);
            }
            len + count
        })
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    /// Returns the removed elements.
    pub fn splice<V: Into<Value>>(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = V>,
    ) -> Vec<Value> {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        self.mutate("splice", || {
            let len = self.len();
            let start = start.min(len);
            let delete_count = delete_count.min(len - start);

            let removed: Vec<Value> = (start..start + delete_count).map(|i| self.get(i)).collect();
            let tail: Vec<Value> = (start + delete_count..len).map(|i| self.get(i)).collect();

            let mut index = start;
            for value in items.into_iter().chain(tail) {
                self.set(index, value);
                index += 1;
            }
            if index < len {
                self.set("length", index);
            }
            removed
        })
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.inner.target)
            .field("flags", &self.inner.flags)
            .finish()
    }
}

/// Pad `items` with `Undefined` up to `len`, failing instead of aborting
/// when the allocation cannot be made.
fn grow(items: &mut Vec<Value>, len: usize) -> std::result::Result<(), TryReserveError> {
    if let Some(additional) = len.checked_sub(items.len()) {
        items.try_reserve(additional)?;
        items.resize(len, Value::Undefined);
    }
    Ok(())
}
