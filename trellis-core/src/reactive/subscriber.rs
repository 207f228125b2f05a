//! Identities for the reactive system.
//!
//! Effects are known to the dependency store as [`SubscriberId`]s and
//! observed structures (raw targets, computed values, refs) as
//! [`TargetId`]s. The store is keyed by these rather than by pointers, so it
//! never keeps anything alive on its own.
//!
//! The reactive core is confined to one thread, and so are the counters.
//! Both kinds share a single sequence, which keeps log lines unambiguous.

use std::cell::Cell;
use std::fmt;

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

fn next_id() -> u64 {
    NEXT_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

/// The effect an entry in a dependency set belongs to.
///
/// Trigger compares it against the running effect to skip self-notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn next() -> Self {
        Self(next_id())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect@{}", self.0)
    }
}

/// An observed structure, as seen by the dependency store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub(crate) fn next() -> Self {
        Self(next_id())
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
