//! Host platform seam.
//!
//! The renderer never touches a concrete tree. Every structural change goes
//! through [`HostOps`], so the same renderer drives a DOM, a terminal UI or
//! the recording [`TestHost`](super::TestHost).

use std::fmt;

use serde::Serialize;

use crate::reactive::Value;

/// Opaque handle of a node owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HostNode(u64);

impl HostNode {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Structural operations a host platform provides.
///
/// Methods take `&self`: hosts keep their tree behind interior mutability
/// because component effects may call back into the renderer while a patch
/// is in progress.
pub trait HostOps {
    fn create_element(&self, tag: &str) -> HostNode;

    fn create_text(&self, text: &str) -> HostNode;

    fn create_comment(&self, text: &str) -> HostNode;

    /// Replace all children of `el` with `text`.
    fn set_element_text(&self, el: HostNode, text: &str);

    /// Update the content of a text or comment node.
    fn set_text(&self, node: HostNode, text: &str);

    /// Insert `el` into `parent` before `anchor`, or append when `anchor` is
    /// `None`. Inserting a node that is already attached moves it.
    fn insert(&self, el: HostNode, parent: HostNode, anchor: Option<HostNode>);

    /// Detach `el` from its parent. A detached node is ignored.
    fn remove(&self, el: HostNode);

    fn parent(&self, node: HostNode) -> Option<HostNode>;

    fn next_sibling(&self, node: HostNode) -> Option<HostNode>;

    /// Apply the change of one prop from `prev` to `next`. `Value::Undefined`
    /// on either side means absent.
    fn patch_prop(&self, el: HostNode, key: &str, prev: &Value, next: &Value);

    /// Resolve a teleport destination.
    fn resolve_target(&self, selector: &str) -> Option<HostNode>;
}
