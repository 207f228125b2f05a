//! Reconciliation Engine
//!
//! [`Renderer::patch`] is the single entry point that turns a new abstract
//! tree into host operations, given the previous tree for the same spot.
//!
//! # How Patching Works
//!
//! 1. If the old and new node differ in type, the old subtree is unmounted
//!    and the new one is mounted where the old one stood. There is no
//!    cross-type diffing.
//!
//! 2. Otherwise the new node's category decides: elements diff props and
//!    children, text and comments update their content, fragments diff
//!    their children between two anchors, components hand over to the
//!    component host, and special nodes run their own `process` hook.
//!
//! 3. Host bookkeeping (`el`, fragment anchors, component instances) moves
//!    from the old node to the new one, so the new tree is always the one
//!    to diff against next time.
//!
//! # Host node ranges
//!
//! A mounted vnode occupies a contiguous range of host siblings. Elements,
//! text and comments occupy one node; fragments span from their start to
//! their end anchor; components span their subtree; teleports leave a
//! single placeholder behind. Moves and anchors are computed on ranges.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::reactive::Value;

use super::children::diff_children;
use super::host::{HostNode, HostOps};
use super::vnode::{Children, PatchFlag, Props, VNode, VNodeType};

/// Children diff algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStrategy {
    /// Scan the old list for every new node; move when the match sits
    /// before the furthest match seen so far.
    Simple,
    /// Compare both ends of both lists.
    DoubleEnded,
    /// Common prefix and suffix, then a longest increasing subsequence
    /// over the remainder.
    #[default]
    Fast,
}

/// Renderer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub diff: DiffStrategy,
}

impl RendererConfig {
    pub fn with_diff(diff: DiffStrategy) -> Self {
        Self { diff }
    }

    /// Load a configuration such as `{ "diff": "double_ended" }`.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// A node kind that takes over its own processing.
///
/// The renderer passes itself in, so implementations reuse `patch`,
/// `patch_children`, `unmount` and `move_to` without the engine knowing
/// what the node means.
pub trait SpecialNode {
    fn name(&self) -> &str;

    /// Mount (`old` is `None`) or update `new`.
    fn process(
        &self,
        old: Option<&VNode>,
        new: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        renderer: &Renderer,
    );

    /// Tear down `vnode`. `remove` is false when an ancestor host node is
    /// being removed anyway.
    fn unmount(&self, vnode: &VNode, renderer: &Renderer, remove: bool);

    /// Move the part of `vnode` that lives in its parent container.
    fn move_to(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>, renderer: &Renderer);
}

pub(crate) struct RendererInner {
    host: Rc<dyn HostOps>,
    config: RendererConfig,
    roots: RefCell<HashMap<HostNode, VNode>>,
}

/// Drives a [`HostOps`] implementation from abstract trees.
#[derive(Clone)]
pub struct Renderer {
    inner: Rc<RendererInner>,
}

/// Handle kept by component effects; does not keep the renderer alive.
#[derive(Clone)]
pub(crate) struct WeakRenderer(Weak<RendererInner>);

impl WeakRenderer {
    pub(crate) fn upgrade(&self) -> Option<Renderer> {
        self.0.upgrade().map(|inner| Renderer { inner })
    }
}

impl Renderer {
    pub fn new(host: Rc<dyn HostOps>, config: RendererConfig) -> Self {
        Self {
            inner: Rc::new(RendererInner {
                host,
                config,
                roots: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn host(&self) -> &dyn HostOps {
        &*self.inner.host
    }

    pub fn config(&self) -> &RendererConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakRenderer {
        WeakRenderer(Rc::downgrade(&self.inner))
    }

    /// Render `vnode` into `container`, diffing against whatever was
    /// rendered there last. `None` unmounts the previous tree.
    pub fn render(&self, vnode: Option<VNode>, container: HostNode) {
        let previous = self.inner.roots.borrow_mut().remove(&container);
        match vnode {
            Some(vnode) => {
                self.patch(previous.as_ref(), &vnode, container, None);
                self.inner.roots.borrow_mut().insert(container, vnode);
            }
            None => {
                if let Some(previous) = previous {
                    self.unmount(&previous);
                }
            }
        }
    }

    /// Whether something is rendered into `container`.
    pub fn has_root(&self, container: HostNode) -> bool {
        self.inner.roots.borrow().contains_key(&container)
    }

    pub fn patch(
        &self,
        old: Option<&VNode>,
        new: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) {
        let mut anchor = anchor;
        let old = match old {
            Some(old) if !old.same_type(new) => {
                // Take the old node's place.
                anchor = self.next_host_sibling(old).or(anchor);
                self.unmount(old);
                None
            }
            old => old,
        };

        match &new.node_type {
            VNodeType::Element(tag) => match old {
                None => self.mount_element(tag, new, container, anchor),
                Some(old) => self.patch_element(old, new),
            },
            VNodeType::Text | VNodeType::Comment => self.process_text(old, new, container, anchor),
            VNodeType::Fragment => self.process_fragment(old, new, container, anchor),
            VNodeType::Component(_) => match old {
                None => self.mount_component(new, container, anchor),
                Some(old) => self.patch_component(old, new),
            },
            VNodeType::Special(special) => {
                special.process(old, new, container, anchor, self);
            }
        }
    }

    fn mount_element(&self, tag: &str, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let host = self.host();
        let el = host.create_element(tag);
        vnode.set_el(Some(el));
        tracing::trace!(%el, tag, "mount element");

        match &vnode.children {
            Children::Text(text) => host.set_element_text(el, text),
            Children::Nodes(children) => {
                for child in children {
                    self.patch(None, child, el, None);
                }
            }
            Children::None | Children::Slots(_) => {}
        }
        for (key, value) in &vnode.props {
            host.patch_prop(el, key, &Value::Undefined, value);
        }
        host.insert(el, container, anchor);
    }

    fn patch_element(&self, old: &VNode, new: &VNode) {
        let Some(el) = old.el() else {
            tracing::warn!(?old, "patching an element that was never mounted");
            return;
        };
        new.set_el(Some(el));

        match new.patch_flag {
            Some(PatchFlag::Text) => {}
            Some(PatchFlag::Class) => {
                let prev = old.props.get("class").cloned().unwrap_or_default();
                let next = new.props.get("class").cloned().unwrap_or_default();
                if prev != next {
                    self.host().patch_prop(el, "class", &prev, &next);
                }
            }
            Some(PatchFlag::Props) | None => self.patch_props(el, &old.props, &new.props),
        }

        if !self.patch_block_children(old, new) {
            self.patch_children(old, new, el, None);
        }
    }

    /// Patch only the dynamic descendants of a block. Returns false when the
    /// two nodes do not share a block shape.
    fn patch_block_children(&self, old: &VNode, new: &VNode) -> bool {
        let (Some(new_paths), Some(old_paths)) = (&new.dynamic_children, &old.dynamic_children) else {
            return false;
        };
        if new_paths != old_paths {
            return false;
        }
        let pairs: Option<Vec<(&VNode, &VNode)>> = new_paths
            .iter()
            .map(|path| Some((old.descendant(path)?, new.descendant(path)?)))
            .collect();
        let Some(pairs) = pairs else {
            return false;
        };

        for (new_child, old_child) in new.children.nodes().iter().zip(old.children.nodes()) {
            new_child.adopt(old_child);
        }
        for (old_child, new_child) in pairs {
            let container = self
                .first_host(old_child)
                .and_then(|node| self.host().parent(node))
                .or(old.el());
            if let Some(container) = container {
                self.patch(Some(old_child), new_child, container, None);
            }
        }
        true
    }

    fn patch_props(&self, el: HostNode, old: &Props, new: &Props) {
        let host = self.host();
        for (key, next) in new {
            let prev = old.get(key).cloned().unwrap_or_default();
            if &prev != next {
                host.patch_prop(el, key, &prev, next);
            }
        }
        for (key, prev) in old {
            if !new.contains_key(key) {
                host.patch_prop(el, key, prev, &Value::Undefined);
            }
        }
    }

    fn process_text(&self, old: Option<&VNode>, new: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let host = self.host();
        let text = new.text_content().unwrap_or_default();
        match old {
            None => {
                let el = if matches!(new.node_type, VNodeType::Comment) {
                    host.create_comment(text)
                } else {
                    host.create_text(text)
                };
                new.set_el(Some(el));
                host.insert(el, container, anchor);
            }
            Some(old) => {
                new.set_el(old.el());
                if old.text_content() != new.text_content() {
                    if let Some(el) = old.el() {
                        host.set_text(el, text);
                    }
                }
            }
        }
    }

    fn process_fragment(&self, old: Option<&VNode>, new: &VNode, container: HostNode, anchor: Option<HostNode>) {
        match old {
            None => {
                let host = self.host();
                let start = host.create_text("");
                let end = host.create_text("");
                new.set_el(Some(start));
                new.set_anchor(Some(end));
                host.insert(start, container, anchor);
                host.insert(end, container, anchor);
                for child in new.children.nodes() {
                    self.patch(None, child, container, Some(end));
                }
            }
            Some(old) => {
                new.set_el(old.el());
                new.set_anchor(old.anchor());
                self.patch_children(old, new, container, old.anchor());
            }
        }
    }

    /// Reconcile the children of `old` into those of `new` inside
    /// `container`. New list nodes without a successor are inserted before
    /// `list_anchor`.
    pub fn patch_children(&self, old: &VNode, new: &VNode, container: HostNode, list_anchor: Option<HostNode>) {
        let host = self.host();
        let is_fragment = matches!(new.node_type, VNodeType::Fragment);
        match (&old.children, &new.children) {
            (_, Children::Text(_)) if is_fragment => {
                tracing::warn!("fragment children must be nodes; text ignored");
            }
            (_, Children::Text(text)) => {
                if let Children::Nodes(nodes) = &old.children {
                    for node in nodes {
                        self.unmount(node);
                    }
                }
                if old.text_content() != Some(&**text) {
                    host.set_element_text(container, text);
                }
            }
            (Children::Nodes(old_nodes), Children::Nodes(new_nodes)) => {
                diff_children(self, old_nodes, new_nodes, container, list_anchor);
            }
            (_, Children::Nodes(new_nodes)) => {
                if matches!(old.children, Children::Text(_)) {
                    host.set_element_text(container, "");
                }
                for node in new_nodes {
                    self.patch(None, node, container, list_anchor);
                }
            }
            (_, Children::None | Children::Slots(_)) => match &old.children {
                Children::Nodes(nodes) => {
                    for node in nodes {
                        self.unmount(node);
                    }
                }
                Children::Text(_) if !is_fragment => host.set_element_text(container, ""),
                _ => {}
            },
        }
    }

    /// Remove `vnode` from the host and tear down every component and
    /// special node inside it.
    pub fn unmount(&self, vnode: &VNode) {
        self.unmount_with(vnode, true);
    }

    pub(crate) fn unmount_with(&self, vnode: &VNode, remove: bool) {
        let host = self.host();
        match &vnode.node_type {
            VNodeType::Element(_) => {
                for child in vnode.children.nodes() {
                    self.unmount_with(child, false);
                }
                if remove {
                    if let Some(el) = vnode.el() {
                        host.remove(el);
                    }
                }
            }
            VNodeType::Text | VNodeType::Comment => {
                if let (true, Some(el)) = (remove, vnode.el()) {
                    host.remove(el);
                }
            }
            VNodeType::Fragment => {
                for child in vnode.children.nodes() {
                    self.unmount_with(child, remove);
                }
                if remove {
                    for node in [vnode.el(), vnode.anchor()].into_iter().flatten() {
                        host.remove(node);
                    }
                }
            }
            VNodeType::Component(_) => {
                if let Some(instance) = vnode.component_instance() {
                    instance.unmount(self, remove);
                }
            }
            VNodeType::Special(special) => special.unmount(vnode, self, remove),
        }
    }

    /// Move the host range of `vnode` before `anchor` in `container`.
    pub fn move_to(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let host = self.host();
        match &vnode.node_type {
            VNodeType::Fragment => {
                if let Some(start) = vnode.el() {
                    host.insert(start, container, anchor);
                }
                for child in vnode.children.nodes() {
                    self.move_to(child, container, anchor);
                }
                if let Some(end) = vnode.anchor() {
                    host.insert(end, container, anchor);
                }
            }
            VNodeType::Component(_) => {
                if let Some(instance) = vnode.component_instance() {
                    instance.with_sub_tree(|tree| self.move_to(tree, container, anchor));
                }
            }
            VNodeType::Special(special) => special.move_to(vnode, container, anchor, self),
            _ => {
                if let Some(el) = vnode.el() {
                    host.insert(el, container, anchor);
                }
            }
        }
    }

    /// First host node of the range `vnode` occupies.
    pub fn first_host(&self, vnode: &VNode) -> Option<HostNode> {
        match &vnode.node_type {
            VNodeType::Component(_) => vnode
                .component_instance()
                .and_then(|instance| instance.with_sub_tree(|tree| self.first_host(tree)))
                .flatten(),
            _ => vnode.el(),
        }
    }

    /// Last host node of the range `vnode` occupies.
    pub fn last_host(&self, vnode: &VNode) -> Option<HostNode> {
        match &vnode.node_type {
            VNodeType::Fragment => vnode.anchor(),
            VNodeType::Component(_) => vnode
                .component_instance()
                .and_then(|instance| instance.with_sub_tree(|tree| self.last_host(tree)))
                .flatten(),
            _ => vnode.el(),
        }
    }

    /// Host node right after the range `vnode` occupies.
    pub fn next_host_sibling(&self, vnode: &VNode) -> Option<HostNode> {
        self.last_host(vnode).and_then(|node| self.host().next_sibling(node))
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("config", &self.inner.config)
            .field("roots", &self.inner.roots.borrow().len())
            .finish()
    }
}
