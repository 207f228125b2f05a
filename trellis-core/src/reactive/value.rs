//! Dynamic values stored in observed targets.
//!
//! Observed data is heterogeneous: records hold numbers next to nested
//! records next to event handlers. [`Value`] is the datum that flows through
//! every target, wrapper, ref and component prop.
//!
//! # Equality
//!
//! `PartialEq`, `Eq` and `Hash` follow SameValueZero: two NaN numbers are
//! equal, `0.0` equals `-0.0`, and targets, wrappers, refs and callbacks
//! compare by identity. This single relation serves both as the "did the
//! value change" test of writes and as the key equality of reactive maps.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::proxy::Reactive;
use super::refs::Ref;
use super::target::{Target, TargetData};

/// A callable stored in a value, such as an event handler or an emitted
/// callback.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&[Value]) -> Value>);

impl Callback {
    pub fn new(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Wrap a handler that ignores its return value.
    pub fn handler(f: impl Fn(&[Value]) + 'static) -> Self {
        Self(Rc::new(move |args| {
            f(args);
            Value::Undefined
        }))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:#x})", self.addr())
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// A raw, unobserved structure.
    Object(Target),
    /// An observed structure.
    Reactive(Reactive),
    Ref(Ref),
    Function(Callback),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Whether this is a structure, raw or wrapped.
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Reactive(_))
    }

    /// JavaScript-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric view; non-numbers yield NaN.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::String(s) => s.trim().parse().unwrap_or(f64::NAN),
            Self::Null => 0.0,
            _ => f64::NAN,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Self::Reactive(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Self::Object(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Option<&Ref> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Strip a wrapper, returning the raw structure it observes.
    pub fn to_raw(&self) -> Value {
        match self {
            Self::Reactive(r) => Self::Object(r.raw()),
            other => other.clone(),
        }
    }

    /// The underlying structure, raw or wrapped.
    pub fn target(&self) -> Option<Target> {
        match self {
            Self::Object(t) => Some(t.clone()),
            Self::Reactive(r) => Some(r.raw()),
            _ => None,
        }
    }

    /// Build a value from JSON. Records become object targets and arrays
    /// become array targets.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(Rc::from(s)),
            other => Self::Object(Target::from_json(other)),
        }
    }

    /// Snapshot the raw data as JSON without tracking.
    ///
    /// Cyclic references and values JSON cannot express become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = Vec::new();
        to_json_inner(self, &mut seen)
    }
}

fn to_json_inner(value: &Value, seen: &mut Vec<u64>) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Undefined | Value::Null | Value::Function(_) => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.to_string()),
        Value::Ref(r) => to_json_inner(&r.get_untracked(), seen),
        Value::Object(_) | Value::Reactive(_) => {
            let Some(target) = value.target() else {
                return Json::Null;
            };
            let id = target.id().raw();
            if seen.contains(&id) {
                return Json::Null;
            }
            seen.push(id);
            let json = target.with_data(|data| match data {
                TargetData::Object(map) => Json::Object(
                    map.iter()
                        .map(|(k, v)| (k.to_string(), to_json_inner(v, seen)))
                        .collect(),
                ),
                TargetData::Array(items) => {
                    Json::Array(items.iter().map(|v| to_json_inner(v, seen)).collect())
                }
                TargetData::Map(map) => Json::Array(
                    map.iter()
                        .map(|(k, v)| Json::Array(vec![to_json_inner(k, seen), to_json_inner(v, seen)]))
                        .collect(),
                ),
                TargetData::Set(set) => Json::Array(set.iter().map(|v| to_json_inner(v, seen)).collect()),
            });
            seen.pop();
            json
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Reactive(a), Self::Reactive(b)) => a.ptr_eq(b),
            (Self::Ref(a), Self::Ref(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Undefined | Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Number(n) => {
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Self::String(s) => s.hash(state),
            Self::Object(t) => t.id().hash(state),
            Self::Reactive(r) => {
                r.raw().id().hash(state);
                r.flags().hash(state);
            }
            Self::Ref(r) => r.id().hash(state),
            Self::Function(f) => f.addr().hash(state),
        }
    }
}

/// Format a number the way a template would print it.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => f.write_str(s),
            Self::Object(t) => write!(f, "{t}"),
            Self::Reactive(r) => write!(f, "{}", r.raw()),
            Self::Ref(r) => write!(f, "{}", r.get_untracked()),
            Self::Function(_) => f.write_str("[function]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Object(t) => write!(f, "Object({})", t.id()),
            Self::Reactive(r) => write!(f, "Reactive({}, {:?})", r.raw().id(), r.flags()),
            Self::Ref(r) => write!(f, "Ref({})", r.id()),
            Self::Function(c) => write!(f, "{c:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::String(s)
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Self::Object(t)
    }
}

impl From<&Target> for Value {
    fn from(t: &Target) -> Self {
        Self::Object(t.clone())
    }
}

impl From<Reactive> for Value {
    fn from(r: Reactive) -> Self {
        Self::Reactive(r)
    }
}

impl From<&Reactive> for Value {
    fn from(r: &Reactive) -> Self {
        Self::Reactive(r.clone())
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Self::Ref(r)
    }
}

impl From<Callback> for Value {
    fn from(c: Callback) -> Self {
        Self::Function(c)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Undefined)
    }
}
