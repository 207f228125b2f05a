//! Map and set interception.
//!
//! Collections are observed per entry rather than per property: `get` and
//! `has` track the entry key, `size` and value iteration track the
//! iteration key, and key-only iteration of a map tracks a separate key so
//! that overwriting a value does not re-run an effect that only lists keys.

use super::proxy::Reactive;
use super::runtime::{TrackKey, TriggerOp};
use super::target::{TargetData, TargetKind};
use super::value::Value;

impl Reactive {
    pub(super) fn map_get(&self, key: Value) -> Value {
        let key = key.to_raw();
        self.track(TrackKey::Entry(key.clone()));
        let value = self.target().with_data(|data| match data {
            TargetData::Map(map) => map.get(&key).cloned(),
            _ => None,
        });
        self.wrap_nested(value.unwrap_or_default())
    }

    pub(super) fn map_set(&self, key: Value, value: Value) {
        let key = key.to_raw();
        let old = self.target().with_data_mut(|data| match data {
            TargetData::Map(map) => map.insert(key.clone(), value.clone()),
            _ => None,
        });
        match old {
            None => self.trigger(TrackKey::Entry(key), TriggerOp::Add, None),
            Some(old) if old != value => self.trigger(TrackKey::Entry(key), TriggerOp::Set, None),
            Some(_) => {}
        }
    }

    pub(super) fn collection_has(&self, key: Value) -> bool {
        let key = key.to_raw();
        self.track(TrackKey::Entry(key.clone()));
        self.target().with_data(|data| match data {
            TargetData::Map(map) => map.contains_key(&key),
            TargetData::Set(set) => set.contains(&key),
            _ => false,
        })
    }

    /// Number of entries, tracked against iteration.
    pub fn size(&self) -> usize {
        self.track(TrackKey::Iterate);
        self.target().len_raw()
    }

    pub(super) fn collection_add(&self, value: Value) {
        let value = value.to_raw();
        let added = self.target().with_data_mut(|data| match data {
            TargetData::Set(set) => set.insert(value.clone()),
            _ => false,
        });
        if added {
            self.trigger(TrackKey::Entry(value), TriggerOp::Add, None);
        }
    }

    pub(super) fn collection_delete(&self, key: Value) -> bool {
        let key = key.to_raw();
        let removed = self.target().with_data_mut(|data| match data {
            TargetData::Map(map) => map.shift_remove(&key).is_some(),
            TargetData::Set(set) => set.shift_remove(&key),
            _ => false,
        });
        if removed {
            self.trigger(TrackKey::Entry(key), TriggerOp::Delete, None);
        }
        removed
    }

    pub(super) fn collection_clear(&self) {
        let had_entries = self.target().with_data_mut(|data| match data {
            TargetData::Map(map) => {
                let had = !map.is_empty();
                map.clear();
                had
            }
            TargetData::Set(set) => {
                let had = !set.is_empty();
                set.clear();
                had
            }
            _ => false,
        });
        if had_entries {
            self.trigger(TrackKey::Iterate, TriggerOp::Clear, None);
        }
    }

    pub(super) fn collection_keys(&self) -> Vec<Value> {
        let key = if self.kind() == TargetKind::Map {
            TrackKey::MapKeyIterate
        } else {
            TrackKey::Iterate
        };
        self.track(key);
        let keys = self.target().with_data(|data| match data {
            TargetData::Map(map) => map.keys().cloned().collect(),
            TargetData::Set(set) => set.iter().cloned().collect(),
            _ => Vec::new(),
        });
        keys.into_iter().map(|k| self.wrap_nested(k)).collect()
    }

    pub(super) fn collection_values(&self) -> Vec<Value> {
        self.track(TrackKey::Iterate);
        let values: Vec<Value> = self.target().with_data(|data| match data {
            TargetData::Map(map) => map.values().cloned().collect(),
            TargetData::Set(set) => set.iter().cloned().collect(),
            _ => Vec::new(),
        });
        values.into_iter().map(|v| self.wrap_nested(v)).collect()
    }

    pub(super) fn collection_entries(&self) -> Vec<(Value, Value)> {
        self.track(TrackKey::Iterate);
        let entries: Vec<(Value, Value)> = self.target().with_data(|data| match data {
            TargetData::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            TargetData::Set(set) => set.iter().map(|v| (v.clone(), v.clone())).collect(),
            _ => Vec::new(),
        });
        entries
            .into_iter()
            .map(|(k, v)| (self.wrap_nested(k), self.wrap_nested(v)))
            .collect()
    }
}
