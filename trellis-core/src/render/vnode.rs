//! Abstract tree nodes.
//!
//! A [`VNode`] describes what a piece of host tree should look like. Render
//! functions build fresh nodes on every run; the renderer diffs them against
//! the previous ones and copies host bookkeeping (`el`, `anchor`, component
//! instance) from old to new as it goes.
//!
//! # Block trees
//!
//! [`VNode::block`] records the index paths of every descendant that carries
//! a [`PatchFlag`]. When an element update sees such a list on both sides it
//! patches only those descendants and adopts the host bookkeeping of the
//! static rest without diffing it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::reactive::Value;

use super::component::{ComponentDef, ComponentInstance};
use super::host::HostNode;
use super::renderer::SpecialNode;

/// Props of a node, in declaration order.
pub type Props = IndexMap<Rc<str>, Value>;

/// Index path from a block root down to one dynamic descendant.
pub type ChildPath = SmallVec<[usize; 4]>;

/// A slot function. Each call renders a fresh subtree.
pub type Slot = Rc<dyn Fn() -> VNode>;

/// Identity of a node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VKey {
    Int(i64),
    Str(Rc<str>),
}

impl From<i64> for VKey {
    fn from(key: i64) -> Self {
        Self::Int(key)
    }
}

impl From<i32> for VKey {
    fn from(key: i32) -> Self {
        Self::Int(i64::from(key))
    }
}

impl From<usize> for VKey {
    fn from(key: usize) -> Self {
        Self::Int(key as i64)
    }
}

impl From<&str> for VKey {
    fn from(key: &str) -> Self {
        Self::Str(Rc::from(key))
    }
}

impl From<String> for VKey {
    fn from(key: String) -> Self {
        Self::Str(Rc::from(key))
    }
}

impl fmt::Display for VKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(key) => write!(f, "{key}"),
            Self::Str(key) => f.write_str(key),
        }
    }
}

/// Which part of an element may change between renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFlag {
    /// Only the text children.
    Text,
    /// Only the `class` prop.
    Class,
    /// Any prop. Children are diffed as usual.
    Props,
}

/// Category of a node.
#[derive(Clone)]
pub enum VNodeType {
    Element(Rc<str>),
    Text,
    Comment,
    Fragment,
    Component(Rc<ComponentDef>),
    /// A node kind that drives its own processing, such as a teleport.
    Special(Rc<dyn SpecialNode>),
}

impl VNodeType {
    /// Whether two nodes of these types can be patched into each other.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Element(a), Self::Element(b)) => a == b,
            (Self::Text, Self::Text) | (Self::Comment, Self::Comment) => true,
            (Self::Fragment, Self::Fragment) => true,
            (Self::Component(a), Self::Component(b)) => Rc::ptr_eq(a, b),
            (Self::Special(a), Self::Special(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl fmt::Debug for VNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(tag) => write!(f, "Element({tag})"),
            Self::Text => f.write_str("Text"),
            Self::Comment => f.write_str("Comment"),
            Self::Fragment => f.write_str("Fragment"),
            Self::Component(def) => write!(f, "Component({})", def.name()),
            Self::Special(special) => write!(f, "Special({})", special.name()),
        }
    }
}

/// Named slots passed to a component.
#[derive(Clone, Default)]
pub struct Slots(IndexMap<Rc<str>, Slot>);

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, slot: impl Fn() -> VNode + 'static) {
        self.0.insert(Rc::from(name), Rc::new(slot));
    }

    pub fn get(&self, name: &str) -> Option<&Slot> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|name| &**name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Children of a node.
#[derive(Clone, Default, Debug)]
pub enum Children {
    #[default]
    None,
    Text(Rc<str>),
    Nodes(Vec<VNode>),
    /// Component children.
    Slots(Slots),
}

impl Children {
    pub fn nodes(&self) -> &[VNode] {
        match self {
            Self::Nodes(nodes) => nodes,
            _ => &[],
        }
    }
}

/// A node of the abstract tree.
#[derive(Clone)]
pub struct VNode {
    pub node_type: VNodeType,
    pub props: Props,
    pub children: Children,
    pub key: Option<VKey>,
    pub patch_flag: Option<PatchFlag>,
    pub dynamic_children: Option<Vec<ChildPath>>,
    el: Cell<Option<HostNode>>,
    anchor: Cell<Option<HostNode>>,
    component: RefCell<Option<Rc<ComponentInstance>>>,
}

impl VNode {
    pub fn new(node_type: VNodeType) -> Self {
        Self {
            node_type,
            props: Props::new(),
            children: Children::None,
            key: None,
            patch_flag: None,
            dynamic_children: None,
            el: Cell::new(None),
            anchor: Cell::new(None),
            component: RefCell::new(None),
        }
    }

    pub fn element(tag: &str) -> Self {
        Self::new(VNodeType::Element(Rc::from(tag)))
    }

    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Self::new(VNodeType::Text).with_children(Children::Text(text.into()))
    }

    pub fn comment(text: impl Into<Rc<str>>) -> Self {
        Self::new(VNodeType::Comment).with_children(Children::Text(text.into()))
    }

    pub fn fragment(children: Vec<VNode>) -> Self {
        Self::new(VNodeType::Fragment).with_children(Children::Nodes(children))
    }

    pub fn component(def: &Rc<ComponentDef>) -> Self {
        Self::new(VNodeType::Component(Rc::clone(def)))
    }

    pub fn special(special: Rc<dyn SpecialNode>) -> Self {
        Self::new(VNodeType::Special(special))
    }

    pub fn prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.props.insert(Rc::from(key), value.into());
        self
    }

    pub fn key(mut self, key: impl Into<VKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set text children.
    pub fn child_text(self, text: impl Into<Rc<str>>) -> Self {
        self.with_children(Children::Text(text.into()))
    }

    pub fn children(self, children: Vec<VNode>) -> Self {
        self.with_children(Children::Nodes(children))
    }

    /// Add a named slot to a component node.
    pub fn slot(mut self, name: &str, slot: impl Fn() -> VNode + 'static) -> Self {
        if !matches!(self.children, Children::Slots(_)) {
            self.children = Children::Slots(Slots::new());
        }
        if let Children::Slots(slots) = &mut self.children {
            slots.insert(name, slot);
        }
        self
    }

    pub fn patch_flag(mut self, flag: PatchFlag) -> Self {
        self.patch_flag = Some(flag);
        self
    }

    pub fn with_children(mut self, children: Children) -> Self {
        self.children = children;
        self
    }

    /// Turn this node into a block root by collecting its dynamic
    /// descendants.
    ///
    /// Nested blocks count as dynamic themselves and are not descended into.
    pub fn block(mut self) -> Self {
        let mut paths = Vec::new();
        let mut prefix = ChildPath::new();
        collect_dynamic(self.children.nodes(), &mut prefix, &mut paths);
        self.dynamic_children = Some(paths);
        self
    }

    /// Follow `path` down the children.
    pub fn descendant(&self, path: &[usize]) -> Option<&VNode> {
        path.iter()
            .try_fold(self, |node, &index| node.children.nodes().get(index))
    }

    pub fn same_type(&self, other: &VNode) -> bool {
        self.node_type.same_as(&other.node_type)
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.node_type {
            VNodeType::Element(tag) => Some(tag),
            _ => None,
        }
    }

    /// The text of a text or comment node, or the text children of an
    /// element.
    pub fn text_content(&self) -> Option<&str> {
        match &self.children {
            Children::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Host node of this vnode once mounted. For fragments this is the start
    /// anchor; for teleports the placeholder left in the parent.
    pub fn el(&self) -> Option<HostNode> {
        self.el.get()
    }

    /// End anchor of a mounted fragment.
    pub fn anchor(&self) -> Option<HostNode> {
        self.anchor.get()
    }

    pub fn component_instance(&self) -> Option<Rc<ComponentInstance>> {
        self.component.borrow().clone()
    }

    pub(crate) fn set_el(&self, el: Option<HostNode>) {
        self.el.set(el);
    }

    pub(crate) fn set_anchor(&self, anchor: Option<HostNode>) {
        self.anchor.set(anchor);
    }

    pub(crate) fn set_component(&self, instance: Option<Rc<ComponentInstance>>) {
        *self.component.borrow_mut() = instance;
    }

    /// Copy host bookkeeping from `old` into `self`, recursively, without
    /// touching the host.
    pub(crate) fn adopt(&self, old: &VNode) {
        self.el.set(old.el.get());
        self.anchor.set(old.anchor.get());
        if let Some(instance) = old.component_instance() {
            self.set_component(Some(instance));
        }
        for (new_child, old_child) in self.children.nodes().iter().zip(old.children.nodes()) {
            new_child.adopt(old_child);
        }
    }
}

fn collect_dynamic(children: &[VNode], prefix: &mut ChildPath, out: &mut Vec<ChildPath>) {
    for (index, child) in children.iter().enumerate() {
        prefix.push(index);
        if child.patch_flag.is_some() || child.dynamic_children.is_some() {
            out.push(prefix.clone());
        } else {
            collect_dynamic(child.children.nodes(), prefix, out);
        }
        prefix.pop();
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("VNode");
        debug.field("type", &self.node_type);
        if let Some(key) = &self.key {
            debug.field("key", key);
        }
        if !self.props.is_empty() {
            debug.field("props", &self.props);
        }
        debug.field("children", &self.children);
        if let Some(el) = self.el.get() {
            debug.field("el", &el);
        }
        debug.finish()
    }
}
