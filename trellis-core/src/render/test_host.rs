//! In-memory recording host.
//!
//! [`TestHost`] is a complete [`HostOps`] implementation backed by a plain
//! node table. It records every operation, counts moves, dispatches events
//! to registered listeners and serializes subtrees to HTML-like strings, so
//! renderer behaviour can be asserted without a real platform.
//!
//! Event listeners go through an invoker: the first handler for an event
//! registers a listener, later handlers only swap what the invoker calls.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::reactive::{Callback, Value};

use super::host::{HostNode, HostOps};

/// DOM properties that hold booleans. An empty string switches them on.
const BOOLEAN_PROPS: &[&str] = &[
    "autofocus", "checked", "disabled", "hidden", "multiple", "open", "readonly", "required",
    "selected",
];

/// One recorded host operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    CreateElement { node: HostNode, tag: String },
    CreateText { node: HostNode, text: String },
    CreateComment { node: HostNode, text: String },
    SetElementText { node: HostNode, text: String },
    SetText { node: HostNode, text: String },
    Insert { node: HostNode, parent: HostNode, anchor: Option<HostNode> },
    /// An insert of a node that was already attached.
    Move { node: HostNode, parent: HostNode, anchor: Option<HostNode> },
    Remove { node: HostNode },
    SetAttribute { node: HostNode, key: String, value: String },
    RemoveAttribute { node: HostNode, key: String },
    SetProperty { node: HostNode, key: String, value: bool },
    AddListener { node: HostNode, event: String },
    RemoveListener { node: HostNode, event: String },
}

#[derive(Debug)]
enum NodeKind {
    Root,
    Element(String),
    Text(String),
    Comment(String),
}

struct Invoker {
    handler: RefCell<Callback>,
}

struct NodeData {
    kind: NodeKind,
    parent: Option<HostNode>,
    children: Vec<HostNode>,
    text: Option<String>,
    attrs: IndexMap<String, String>,
    flags: IndexMap<String, bool>,
    listeners: HashMap<String, Rc<Invoker>>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            text: None,
            attrs: IndexMap::new(),
            flags: IndexMap::new(),
            listeners: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct HostState {
    nodes: HashMap<HostNode, NodeData>,
    next_id: u64,
    ops: Vec<HostOp>,
    targets: HashMap<String, HostNode>,
}

impl HostState {
    fn create(&mut self, kind: NodeKind) -> HostNode {
        self.next_id += 1;
        let node = HostNode::new(self.next_id);
        self.nodes.insert(node, NodeData::new(kind));
        node
    }

    /// Unlink `node` from its parent. Returns whether it was attached.
    fn detach(&mut self, node: HostNode) -> bool {
        let Some(parent) = self.nodes.get_mut(&node).and_then(|data| data.parent.take()) else {
            return false;
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|child| *child != node);
        }
        true
    }
}

/// Recording in-memory host.
#[derive(Default)]
pub struct TestHost {
    state: RefCell<HostState>,
}

fn is_event_key(key: &str) -> bool {
    key.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase)
}

impl TestHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached container and register it as a teleport target
    /// under `name`.
    pub fn create_root(&self, name: &str) -> HostNode {
        let mut state = self.state.borrow_mut();
        let node = state.create(NodeKind::Root);
        state.targets.insert(name.to_owned(), node);
        node
    }

    pub fn ops(&self) -> Vec<HostOp> {
        self.state.borrow().ops.clone()
    }

    /// The op log as JSON, one object per op tagged by `op`.
    pub fn ops_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.state.borrow().ops).unwrap_or_default()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    /// Number of moves since the log was last cleared.
    pub fn moves(&self) -> usize {
        self.count_ops(|op| matches!(op, HostOp::Move { .. }))
    }

    pub fn count_ops(&self, predicate: impl Fn(&HostOp) -> bool) -> usize {
        self.state.borrow().ops.iter().filter(|op| predicate(op)).count()
    }

    pub fn children(&self, node: HostNode) -> Vec<HostNode> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    pub fn tag(&self, node: HostNode) -> Option<String> {
        match &self.state.borrow().nodes.get(&node)?.kind {
            NodeKind::Element(tag) => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn attribute(&self, node: HostNode, key: &str) -> Option<String> {
        self.state.borrow().nodes.get(&node)?.attrs.get(key).cloned()
    }

    pub fn property(&self, node: HostNode, key: &str) -> Option<bool> {
        self.state.borrow().nodes.get(&node)?.flags.get(key).copied()
    }

    /// Concatenated text of `node` and its descendants.
    pub fn text_content(&self, node: HostNode) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        collect_text(&state, node, &mut out);
        out
    }

    /// Serialize the children of `node` (or the node itself when it is not
    /// a root) to an HTML-like string.
    pub fn to_html(&self, node: HostNode) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        write_html(&state, node, &mut out);
        out
    }

    /// Fire `event` on `node`. Returns false when no listener is attached.
    pub fn dispatch(&self, node: HostNode, event: &str, args: &[Value]) -> bool {
        let invoker = self
            .state
            .borrow()
            .nodes
            .get(&node)
            .and_then(|data| data.listeners.get(event).cloned());
        match invoker {
            Some(invoker) => {
                let handler = invoker.handler.borrow().clone();
                handler.call(args);
                true
            }
            None => false,
        }
    }

    fn record(&self, op: HostOp) {
        self.state.borrow_mut().ops.push(op);
    }

    fn patch_event(&self, el: HostNode, key: &str, next: &Value) {
        let event = key[2..].to_lowercase();
        let mut state = self.state.borrow_mut();
        let Some(data) = state.nodes.get_mut(&el) else {
            return;
        };
        let op = match next {
            Value::Function(handler) => {
                if let Some(invoker) = data.listeners.get(&event) {
                    *invoker.handler.borrow_mut() = handler.clone();
                    None
                } else {
                    let invoker = Rc::new(Invoker {
                        handler: RefCell::new(handler.clone()),
                    });
                    data.listeners.insert(event.clone(), invoker);
                    Some(HostOp::AddListener { node: el, event })
                }
            }
            _ => data
                .listeners
                .remove(&event)
                .map(|_| HostOp::RemoveListener { node: el, event }),
        };
        state.ops.extend(op);
    }
}

fn collect_text(state: &HostState, node: HostNode, out: &mut String) {
    let Some(data) = state.nodes.get(&node) else {
        return;
    };
    match &data.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Comment(_) => {}
        NodeKind::Root | NodeKind::Element(_) => {
            if let Some(text) = &data.text {
                out.push_str(text);
            }
            for child in &data.children {
                collect_text(state, *child, out);
            }
        }
    }
}

fn write_html(state: &HostState, node: HostNode, out: &mut String) {
    let Some(data) = state.nodes.get(&node) else {
        return;
    };
    let write_children = |out: &mut String| {
        if let Some(text) = &data.text {
            out.push_str(text);
        }
        for child in &data.children {
            write_html(state, *child, out);
        }
    };
    match &data.kind {
        NodeKind::Root => write_children(out),
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Comment(text) => {
            let _ = write!(out, "<!--{text}-->");
        }
        NodeKind::Element(tag) => {
            let _ = write!(out, "<{tag}");
            for (key, value) in &data.attrs {
                let _ = write!(out, r#" {key}="{value}""#);
            }
            for (key, on) in &data.flags {
                if *on {
                    let _ = write!(out, " {key}");
                }
            }
            out.push('>');
            write_children(out);
            let _ = write!(out, "</{tag}>");
        }
    }
}

impl HostOps for TestHost {
    fn create_element(&self, tag: &str) -> HostNode {
        let node = self.state.borrow_mut().create(NodeKind::Element(tag.to_owned()));
        self.record(HostOp::CreateElement {
            node,
            tag: tag.to_owned(),
        });
        node
    }

    fn create_text(&self, text: &str) -> HostNode {
        let node = self.state.borrow_mut().create(NodeKind::Text(text.to_owned()));
        self.record(HostOp::CreateText {
            node,
            text: text.to_owned(),
        });
        node
    }

    fn create_comment(&self, text: &str) -> HostNode {
        let node = self.state.borrow_mut().create(NodeKind::Comment(text.to_owned()));
        self.record(HostOp::CreateComment {
            node,
            text: text.to_owned(),
        });
        node
    }

    fn set_element_text(&self, el: HostNode, text: &str) {
        let mut state = self.state.borrow_mut();
        let children = match state.nodes.get_mut(&el) {
            Some(data) => {
                data.text = (!text.is_empty()).then(|| text.to_owned());
                std::mem::take(&mut data.children)
            }
            None => return,
        };
        for child in children {
            if let Some(data) = state.nodes.get_mut(&child) {
                data.parent = None;
            }
        }
        state.ops.push(HostOp::SetElementText {
            node: el,
            text: text.to_owned(),
        });
    }

    fn set_text(&self, node: HostNode, text: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(data) = state.nodes.get_mut(&node) {
            match &mut data.kind {
                NodeKind::Text(content) | NodeKind::Comment(content) => *content = text.to_owned(),
                _ => return,
            }
        }
        state.ops.push(HostOp::SetText {
            node,
            text: text.to_owned(),
        });
    }

    fn insert(&self, el: HostNode, parent: HostNode, anchor: Option<HostNode>) {
        let mut state = self.state.borrow_mut();
        if !state.nodes.contains_key(&el) || !state.nodes.contains_key(&parent) {
            tracing::warn!(%el, %parent, "insert of unknown node");
            return;
        }
        let moved = state.detach(el);
        if let Some(siblings) = state.nodes.get_mut(&parent).map(|data| &mut data.children) {
            let index = anchor
                .and_then(|anchor| siblings.iter().position(|child| *child == anchor))
                .unwrap_or(siblings.len());
            siblings.insert(index, el);
        }
        if let Some(data) = state.nodes.get_mut(&el) {
            data.parent = Some(parent);
        }
        state.ops.push(if moved {
            HostOp::Move { node: el, parent, anchor }
        } else {
            HostOp::Insert { node: el, parent, anchor }
        });
    }

    fn remove(&self, el: HostNode) {
        let mut state = self.state.borrow_mut();
        if state.detach(el) {
            state.ops.push(HostOp::Remove { node: el });
        }
    }

    fn parent(&self, node: HostNode) -> Option<HostNode> {
        self.state.borrow().nodes.get(&node)?.parent
    }

    fn next_sibling(&self, node: HostNode) -> Option<HostNode> {
        let state = self.state.borrow();
        let parent = state.nodes.get(&node)?.parent?;
        let siblings = &state.nodes.get(&parent)?.children;
        let index = siblings.iter().position(|child| *child == node)?;
        siblings.get(index + 1).copied()
    }

    fn patch_prop(&self, el: HostNode, key: &str, _prev: &Value, next: &Value) {
        if is_event_key(key) {
            self.patch_event(el, key, next);
            return;
        }

        let mut state = self.state.borrow_mut();
        let Some(data) = state.nodes.get_mut(&el) else {
            return;
        };
        let op = if BOOLEAN_PROPS.contains(&key) {
            let on = match next {
                Value::String(text) if text.is_empty() => true,
                other => other.is_truthy(),
            };
            data.flags.insert(key.to_owned(), on);
            HostOp::SetProperty {
                node: el,
                key: key.to_owned(),
                value: on,
            }
        } else if next.is_nullish() || matches!(next, Value::Bool(false)) {
            data.attrs.shift_remove(key);
            HostOp::RemoveAttribute {
                node: el,
                key: key.to_owned(),
            }
        } else {
            let value = next.to_string();
            data.attrs.insert(key.to_owned(), value.clone());
            HostOp::SetAttribute {
                node: el,
                key: key.to_owned(),
                value,
            }
        };
        state.ops.push(op);
    }

    fn resolve_target(&self, selector: &str) -> Option<HostNode> {
        let name = selector.strip_prefix('#').unwrap_or(selector);
        self.state.borrow().targets.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn insert_before_anchor_and_move() {
        let host = TestHost::new();
        let root = host.create_root("app");
        let a = host.create_text("a");
        let b = host.create_text("b");
        host.insert(a, root, None);
        host.insert(b, root, Some(a));
        assert_eq!(host.to_html(root), "ba");
        assert_eq!(host.moves(), 0);

        host.insert(b, root, None);
        assert_eq!(host.to_html(root), "ab");
        assert_eq!(host.moves(), 1);
        assert_eq!(host.next_sibling(a), Some(b));
        assert_eq!(host.parent(a), Some(root));
    }

    #[test]
    fn boolean_props_coerce() {
        let host = TestHost::new();
        let el = host.create_element("button");
        host.patch_prop(el, "disabled", &Value::Undefined, &Value::from(""));
        assert_eq!(host.property(el, "disabled"), Some(true));
        host.patch_prop(el, "disabled", &Value::from(""), &Value::from(false));
        assert_eq!(host.property(el, "disabled"), Some(false));
    }

    #[test]
    fn attributes_set_and_remove() {
        let host = TestHost::new();
        let el = host.create_element("div");
        host.patch_prop(el, "class", &Value::Undefined, &Value::from("box"));
        assert_eq!(host.attribute(el, "class").as_deref(), Some("box"));
        host.patch_prop(el, "class", &Value::from("box"), &Value::Undefined);
        assert_eq!(host.attribute(el, "class"), None);
    }

    #[test]
    fn invoker_swaps_handler_without_reregistering() {
        let host = TestHost::new();
        let el = host.create_element("button");
        let hits = Rc::new(Cell::new(0));

        let first = hits.clone();
        host.patch_prop(
            el,
            "onClick",
            &Value::Undefined,
            &Value::from(Callback::handler(move |_| first.set(first.get() + 1))),
        );
        let second = hits.clone();
        host.patch_prop(
            el,
            "onClick",
            &Value::Undefined,
            &Value::from(Callback::handler(move |_| second.set(second.get() + 10))),
        );

        assert!(host.dispatch(el, "click", &[]));
        assert_eq!(hits.get(), 10);
        assert_eq!(host.count_ops(|op| matches!(op, HostOp::AddListener { .. })), 1);

        host.patch_prop(el, "onClick", &Value::Undefined, &Value::Undefined);
        assert!(!host.dispatch(el, "click", &[]));
    }

    #[test]
    fn ops_serialize_tagged() {
        let host = TestHost::new();
        host.create_element("p");
        assert_eq!(host.ops_json()[0]["op"], "create_element");
        assert_eq!(host.ops_json()[0]["tag"], "p");
    }
}
