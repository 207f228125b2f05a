//! Raw observed structures.
//!
//! A [`Target`] is the plain data a wrapper observes: a record, an array, a
//! map or a set. Reading or writing a target directly never tracks and never
//! triggers; only the wrapper in [`super::proxy`] does that.
//!
//! A target owns its data exclusively. Dropping the last handle removes the
//! target's entry from the dependency store.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};

use super::proxy::{ProxyFlags, ProxyInner, Reactive};
use super::runtime::Runtime;
use super::subscriber::TargetId;
use super::value::{format_number, Value};

/// The shape of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Object,
    Array,
    Map,
    Set,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::Map => "map",
            Self::Set => "set",
        })
    }
}

/// The data held by a target.
#[derive(Debug, Clone)]
pub enum TargetData {
    Object(IndexMap<Rc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

impl TargetData {
    fn kind(&self) -> TargetKind {
        match self {
            Self::Object(_) => TargetKind::Object,
            Self::Array(_) => TargetKind::Array,
            Self::Map(_) => TargetKind::Map,
            Self::Set(_) => TargetKind::Set,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Object(map) => map.len(),
            Self::Array(items) => items.len(),
            Self::Map(map) => map.len(),
            Self::Set(set) => set.len(),
        }
    }
}

pub(crate) struct TargetInner {
    id: TargetId,
    kind: TargetKind,
    data: RefCell<TargetData>,
    proto: RefCell<Option<Reactive>>,
    /// One cached wrapper per [`ProxyFlags`] combination.
    proxies: RefCell<[Weak<ProxyInner>; 4]>,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        Runtime::forget(self.id);
    }
}

/// A raw observed structure. Cloning shares the same structure.
#[derive(Clone)]
pub struct Target {
    inner: Rc<TargetInner>,
}

/// Arrays hold at most `2^32 - 1` items; indices stop one below that.
pub(crate) const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// How a dynamic key addresses an array.
pub(crate) enum ArrayKey {
    Index(usize),
    Length,
    Other(String),
}

impl Target {
    pub fn new(data: TargetData) -> Self {
        Self {
            inner: Rc::new(TargetInner {
                id: TargetId::next(),
                kind: data.kind(),
                data: RefCell::new(data),
                proto: RefCell::new(None),
                proxies: RefCell::new(Default::default()),
            }),
        }
    }

    /// An empty record.
    pub fn object() -> Self {
        Self::new(TargetData::Object(IndexMap::new()))
    }

    /// An empty array.
    pub fn array() -> Self {
        Self::new(TargetData::Array(Vec::new()))
    }

    /// An empty map.
    pub fn map() -> Self {
        Self::new(TargetData::Map(IndexMap::new()))
    }

    /// An empty set.
    pub fn set() -> Self {
        Self::new(TargetData::Set(IndexSet::new()))
    }

    /// A record from `(name, value)` pairs.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        Self::new(TargetData::Object(
            entries
                .into_iter()
                .map(|(k, v)| (Rc::from(k.as_ref()), v.into()))
                .collect(),
        ))
    }

    /// An array from values.
    pub fn from_values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::new(TargetData::Array(values.into_iter().map(Into::into).collect()))
    }

    /// A map from `(key, value)` pairs.
    pub fn map_from<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::new(TargetData::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into().to_raw(), v.into().to_raw()))
                .collect(),
        ))
    }

    /// A set from members.
    pub fn set_from<V: Into<Value>>(members: impl IntoIterator<Item = V>) -> Self {
        Self::new(TargetData::Set(
            members.into_iter().map(|v| v.into().to_raw()).collect(),
        ))
    }

    /// Build a target from JSON. Scalars become a one-element array.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => Self::new(TargetData::Object(
                map.into_iter()
                    .map(|(k, v)| (Rc::from(k), Value::from_json(v)))
                    .collect(),
            )),
            serde_json::Value::Array(items) => Self::new(TargetData::Array(
                items.into_iter().map(Value::from_json).collect(),
            )),
            scalar => Self::new(TargetData::Array(vec![Value::from_json(scalar)])),
        }
    }

    /// Attach a prototype wrapper. Missing properties are read through it.
    pub fn with_prototype(self, proto: &Reactive) -> Self {
        *self.inner.proto.borrow_mut() = Some(proto.clone());
        self
    }

    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn kind(&self) -> TargetKind {
        self.inner.kind
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn prototype(&self) -> Option<Reactive> {
        self.inner.proto.borrow().clone()
    }

    /// Number of entries, untracked.
    pub fn len_raw(&self) -> usize {
        self.inner.data.borrow().len()
    }

    /// Read an entry without tracking.
    pub fn get_raw(&self, key: impl Into<Value>) -> Value {
        let key = key.into();
        let data = self.inner.data.borrow();
        match &*data {
            TargetData::Object(map) => map.get(&object_key(&key)).cloned(),
            TargetData::Array(items) => match array_key(&key) {
                ArrayKey::Index(i) => items.get(i).cloned(),
                ArrayKey::Length => Some(Value::from(items.len())),
                ArrayKey::Other(_) => None,
            },
            TargetData::Map(map) => map.get(&key.to_raw()).cloned(),
            TargetData::Set(set) => set.contains(&key.to_raw()).then(|| Value::Bool(true)),
        }
        .unwrap_or_default()
    }

    /// Write an entry without triggering. Writes that do not fit the shape
    /// (such as a non-index array key) are ignored.
    pub fn set_raw(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut data = self.inner.data.borrow_mut();
        match &mut *data {
            TargetData::Object(map) => {
                map.insert(object_key(&key), value);
            }
            TargetData::Array(items) => {
                if let ArrayKey::Index(i) = array_key(&key) {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                }
            }
            TargetData::Map(map) => {
                map.insert(key.to_raw(), value);
            }
            TargetData::Set(set) => {
                set.insert(key.to_raw());
            }
        }
    }

    /// Snapshot of the data.
    pub fn snapshot(&self) -> TargetData {
        self.inner.data.borrow().clone()
    }

    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&TargetData) -> R) -> R {
        f(&self.inner.data.borrow())
    }

    pub(crate) fn with_data_mut<R>(&self, f: impl FnOnce(&mut TargetData) -> R) -> R {
        f(&mut self.inner.data.borrow_mut())
    }

    /// Own property lookup, then the prototype chain, without tracking.
    pub(crate) fn lookup_chain(&self, name: &str) -> Option<Value> {
        let own = self.with_data(|data| match data {
            TargetData::Object(map) => map.get(name).cloned(),
            _ => None,
        });
        own.or_else(|| self.prototype().and_then(|proto| proto.raw().lookup_chain(name)))
    }

    pub(crate) fn has_own(&self, name: &str) -> bool {
        self.with_data(|data| matches!(data, TargetData::Object(map) if map.contains_key(name)))
    }

    pub(crate) fn cached_proxy(&self, flags: ProxyFlags) -> Option<Rc<ProxyInner>> {
        self.inner.proxies.borrow()[flags.slot()].upgrade()
    }

    pub(crate) fn cache_proxy(&self, flags: ProxyFlags, proxy: &Rc<ProxyInner>) {
        self.inner.proxies.borrow_mut()[flags.slot()] = Rc::downgrade(proxy);
    }
}

/// Property name used for a dynamic key on a record.
pub(crate) fn object_key(key: &Value) -> Rc<str> {
    match key {
        Value::String(s) => Rc::clone(s),
        Value::Number(n) => Rc::from(format_number(*n)),
        other => Rc::from(other.to_string()),
    }
}

pub(crate) fn array_key(key: &Value) -> ArrayKey {
    match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n < MAX_ARRAY_LENGTH as f64 => {
            ArrayKey::Index(*n as usize)
        }
        Value::String(s) if &**s == "length" => ArrayKey::Length,
        Value::String(s) => match s.parse::<usize>() {
            Ok(i) if i < MAX_ARRAY_LENGTH => ArrayKey::Index(i),
            _ => ArrayKey::Other(s.to_string()),
        },
        other => ArrayKey::Other(other.to_string()),
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TargetKind::Object => f.write_str("[object Object]"),
            TargetKind::Map => f.write_str("[object Map]"),
            TargetKind::Set => f.write_str("[object Set]"),
            TargetKind::Array => {
                let items = self.with_data(|data| match data {
                    TargetData::Array(items) => items.clone(),
                    _ => Vec::new(),
                });
                let parts: Vec<String> = items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                    .collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("len", &self.len_raw())
            .finish()
    }
}
