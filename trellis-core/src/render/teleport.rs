//! Teleport: children rendered into another container.
//!
//! A teleport node leaves a comment placeholder where it stands and mounts
//! its children into the host node its `to` prop resolves to. Changing `to`
//! moves the children over. The resolved target is kept in the vnode's
//! `anchor` slot. A target that cannot be found leaves the children
//! unmounted until a later patch resolves it.

use std::rc::Rc;

use crate::reactive::Value;

use super::host::HostNode;
use super::renderer::{Renderer, SpecialNode};
use super::vnode::VNode;

pub struct Teleport;

thread_local! {
    static TELEPORT: Rc<Teleport> = Rc::new(Teleport);
}

impl Teleport {
    /// A teleport node sending `children` to the target named `to`.
    pub fn vnode(to: &str, children: Vec<VNode>) -> VNode {
        let special: Rc<dyn SpecialNode> = TELEPORT.with(Rc::clone);
        VNode::special(special).prop("to", to).children(children)
    }

    fn resolve(vnode: &VNode, renderer: &Renderer) -> Option<HostNode> {
        let to = vnode.props.get("to").and_then(Value::as_str).unwrap_or_default();
        let target = renderer.host().resolve_target(to);
        if target.is_none() {
            tracing::warn!(to, "teleport target not found");
        }
        target
    }

    fn mount_children(vnode: &VNode, renderer: &Renderer) {
        let Some(target) = Self::resolve(vnode, renderer) else {
            return;
        };
        vnode.set_anchor(Some(target));
        for child in vnode.children.nodes() {
            renderer.patch(None, child, target, None);
        }
    }
}

impl SpecialNode for Teleport {
    fn name(&self) -> &str {
        "Teleport"
    }

    fn process(
        &self,
        old: Option<&VNode>,
        new: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        renderer: &Renderer,
    ) {
        let host = renderer.host();
        let Some(old) = old else {
            let placeholder = host.create_comment("teleport");
            host.insert(placeholder, container, anchor);
            new.set_el(Some(placeholder));
            Self::mount_children(new, renderer);
            return;
        };

        new.set_el(old.el());
        new.set_anchor(old.anchor());
        let Some(target) = old.anchor() else {
            Self::mount_children(new, renderer);
            return;
        };
        renderer.patch_children(old, new, target, None);

        if old.props.get("to") != new.props.get("to") {
            if let Some(next) = Self::resolve(new, renderer) {
                for child in new.children.nodes() {
                    renderer.move_to(child, next, None);
                }
                new.set_anchor(Some(next));
            }
        }
    }

    fn unmount(&self, vnode: &VNode, renderer: &Renderer, remove: bool) {
        for child in vnode.children.nodes() {
            renderer.unmount(child);
        }
        if let (true, Some(placeholder)) = (remove, vnode.el()) {
            renderer.host().remove(placeholder);
        }
    }

    fn move_to(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>, renderer: &Renderer) {
        if let Some(placeholder) = vnode.el() {
            renderer.host().insert(placeholder, container, anchor);
        }
    }
}
