//! Refs
//!
//! A [`Ref`] is a single observed slot. Owned refs keep their value in a
//! one-field record named `value`, so they reuse the wrapper machinery
//! wholesale. Property refs hold no value of their own: they read and write
//! one key of another wrapper, which keeps a destructured field connected
//! to its source.
//!
//! [`ProxyRefs`] goes the other way: it exposes a record whose fields may be
//! refs as if they were plain values.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context::untracked;
use super::proxy::{reactive, shallow_reactive, Reactive};
use super::subscriber::TargetId;
use super::target::Target;
use super::value::Value;

const VALUE_KEY: &str = "value";

enum RefKind {
    Owned(Reactive),
    Property { source: Reactive, key: Value },
}

struct RefInner {
    id: TargetId,
    kind: RefKind,
}

/// An observed single value.
#[derive(Clone)]
pub struct Ref {
    inner: Rc<RefInner>,
}

impl Ref {
    /// A ref whose nested structures are observed deeply.
    pub fn new(value: impl Into<Value>) -> Self {
        Self::owned(reactive(&Self::slot(value.into())))
    }

    fn slot(value: Value) -> Target {
        Target::from_entries([(VALUE_KEY, value)])
    }

    fn owned(record: Reactive) -> Self {
        Self {
            inner: Rc::new(RefInner {
                id: record.id(),
                kind: RefKind::Owned(record),
            }),
        }
    }

    pub fn get(&self) -> Value {
        match &self.inner.kind {
            RefKind::Owned(record) => record.get(VALUE_KEY),
            RefKind::Property { source, key } => source.get(key.clone()),
        }
    }

    pub fn set(&self, value: impl Into<Value>) {
        match &self.inner.kind {
            RefKind::Owned(record) => record.set(VALUE_KEY, value),
            RefKind::Property { source, key } => source.set(key.clone(), value),
        }
    }

    /// Read without registering a dependency.
    pub fn get_untracked(&self) -> Value {
        untracked(|| self.get())
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner.kind {
            RefKind::Owned(_) => "owned",
            RefKind::Property { .. } => "property",
        };
        f.debug_struct("Ref")
            .field("id", &self.inner.id)
            .field("kind", &kind)
            .field("value", &self.get_untracked())
            .finish()
    }
}

/// A ref that only observes replacement of its value, not the inside of it.
pub fn shallow_ref(value: impl Into<Value>) -> Ref {
    Ref::owned(shallow_reactive(&Ref::slot(value.into())))
}

/// A ref reading and writing `source[key]`.
pub fn to_ref(source: &Reactive, key: impl Into<Value>) -> Ref {
    Ref {
        inner: Rc::new(RefInner {
            id: TargetId::next(),
            kind: RefKind::Property {
                source: source.clone(),
                key: key.into(),
            },
        }),
    }
}

/// A property ref for every enumerable key of `source`.
pub fn to_refs(source: &Reactive) -> IndexMap<Rc<str>, Ref> {
    source
        .keys()
        .into_iter()
        .map(|key| (Rc::from(key.to_string()), to_ref(source, key)))
        .collect()
}

pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// The inner value of a ref, or the value itself.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

/// A record view that unwraps ref fields on read and writes through them.
#[derive(Clone, Debug)]
pub struct ProxyRefs {
    source: Reactive,
}

pub fn proxy_refs(source: &Reactive) -> ProxyRefs {
    ProxyRefs {
        source: source.clone(),
    }
}

impl ProxyRefs {
    pub fn get(&self, key: impl Into<Value>) -> Value {
        unref(&self.source.get(key))
    }

    /// Write `key`. A ref stored there receives the value instead, unless
    /// the new value is itself a ref.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let existing = untracked(|| self.source.get(key.clone()));
        match existing {
            Value::Ref(r) if !is_ref(&value) => r.set(value),
            _ => self.source.set(key, value),
        }
    }

    pub fn has(&self, key: impl Into<Value>) -> bool {
        self.source.has(key)
    }

    pub fn source(&self) -> &Reactive {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;
    use crate::reactive::{effect, EffectOptions};

    #[test]
    fn ref_is_reactive() {
        let count = Ref::new(1);
        let seen = Rc::new(Cell::new(0.0));
        let (reader, sink) = (count.clone(), seen.clone());
        let _effect = effect(move || sink.set(reader.get().as_f64()), EffectOptions::default());

        count.set(2);
        assert_eq!(seen.get(), 2.0);
        assert!(is_ref(&Value::from(count)));
    }

    #[test]
    fn shallow_ref_does_not_observe_inside() {
        let r = shallow_ref(Target::from_json(json!({ "a": 1 })));
        assert!(matches!(r.get(), Value::Object(_)));
        assert!(matches!(Ref::new(Target::object()).get(), Value::Reactive(_)));
    }

    #[test]
    fn to_ref_stays_connected() {
        let obj = Reactive::from_json(json!({ "foo": 1, "bar": 2 }));
        let refs = to_refs(&obj);
        assert_eq!(refs.len(), 2);

        let foo = &refs["foo"];
        let seen = Rc::new(Cell::new(0.0));
        let (reader, sink) = (foo.clone(), seen.clone());
        let _effect = effect(move || sink.set(reader.get().as_f64()), EffectOptions::default());

        obj.set("foo", 10);
        assert_eq!(seen.get(), 10.0);
        foo.set(20);
        assert_eq!(obj.get("foo"), Value::from(20));
    }

    #[test]
    fn proxy_refs_unwraps_and_writes_through() {
        let count = Ref::new(1);
        let state = Reactive::from_json(json!({ "plain": 1 }));
        state.set("count", count.clone());

        let view = proxy_refs(&state);
        assert_eq!(view.get("count"), Value::from(1));
        view.set("count", 5);
        assert_eq!(count.get(), Value::from(5));
        view.set("plain", 2);
        assert_eq!(view.get("plain"), Value::from(2));
        assert_eq!(unref(&Value::from(3)), Value::from(3));
    }
}
