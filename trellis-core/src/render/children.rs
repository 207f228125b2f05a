//! Children diff strategies.
//!
//! All three strategies take the same inputs and leave the host in the same
//! state: the new key order, every surviving node patched in place, every
//! vanished key unmounted exactly once and every new key mounted exactly
//! once. They differ in how many moves they spend getting there.
//!
//! Lists where some node has no key are diffed by position instead.
//! Duplicate keys within one list are not supported.

use std::collections::HashMap;

use super::host::HostNode;
use super::lis::longest_increasing_subsequence;
use super::renderer::{DiffStrategy, Renderer};
use super::vnode::{VKey, VNode};

pub(crate) fn diff_children(
    renderer: &Renderer,
    old: &[VNode],
    new: &[VNode],
    container: HostNode,
    anchor: Option<HostNode>,
) {
    let keyed = old.iter().chain(new).all(|node| node.key.is_some());
    if !keyed {
        diff_unkeyed(renderer, old, new, container, anchor);
        return;
    }
    match renderer.config().diff {
        DiffStrategy::Simple => diff_simple(renderer, old, new, container, anchor),
        DiffStrategy::DoubleEnded => diff_double_ended(renderer, old, new, container, anchor),
        DiffStrategy::Fast => diff_fast(renderer, old, new, container, anchor),
    }
}

fn same_key(a: &VNode, b: &VNode) -> bool {
    a.key == b.key
}

/// Anchor for the node that must end up right before `new[next]`.
fn anchor_before(
    renderer: &Renderer,
    new: &[VNode],
    next: usize,
    anchor: Option<HostNode>,
) -> Option<HostNode> {
    new.get(next).and_then(|node| renderer.first_host(node)).or(anchor)
}

fn diff_unkeyed(
    renderer: &Renderer,
    old: &[VNode],
    new: &[VNode],
    container: HostNode,
    anchor: Option<HostNode>,
) {
    let common = old.len().min(new.len());
    for (old_node, new_node) in old.iter().zip(new) {
        renderer.patch(Some(old_node), new_node, container, None);
    }
    let next = old.get(common).and_then(|node| renderer.first_host(node)).or(anchor);
    for node in &new[common..] {
        renderer.patch(None, node, container, next);
    }
    for node in &old[common..] {
        renderer.unmount(node);
    }
}

fn diff_simple(
    renderer: &Renderer,
    old: &[VNode],
    new: &[VNode],
    container: HostNode,
    anchor: Option<HostNode>,
) {
    let start = old.first().and_then(|node| renderer.first_host(node)).or(anchor);
    let mut last_index = 0;
    for (i, new_node) in new.iter().enumerate() {
        let found = old.iter().position(|old_node| same_key(old_node, new_node));
        match found {
            Some(j) => {
                renderer.patch(Some(&old[j]), new_node, container, None);
                if j < last_index {
                    let after = renderer.next_host_sibling(&new[i - 1]);
                    renderer.move_to(new_node, container, after);
                } else {
                    last_index = j;
                }
            }
            None => {
                let at = if i == 0 {
                    start
                } else {
                    renderer.next_host_sibling(&new[i - 1])
                };
                renderer.patch(None, new_node, container, at);
            }
        }
    }
    for old_node in old {
        if !new.iter().any(|new_node| same_key(old_node, new_node)) {
            renderer.unmount(old_node);
        }
    }
}

fn diff_double_ended(
    renderer: &Renderer,
    old: &[VNode],
    new: &[VNode],
    container: HostNode,
    anchor: Option<HostNode>,
) {
    let mut taken = vec![false; old.len()];
    // Half-open ranges: old[os..oe], new[ns..ne].
    let (mut os, mut oe) = (0, old.len());
    let (mut ns, mut ne) = (0, new.len());

    while os < oe && ns < ne {
        if taken[os] {
            os += 1;
        } else if taken[oe - 1] {
            oe -= 1;
        } else if same_key(&old[os], &new[ns]) {
            renderer.patch(Some(&old[os]), &new[ns], container, None);
            os += 1;
            ns += 1;
        } else if same_key(&old[oe - 1], &new[ne - 1]) {
            renderer.patch(Some(&old[oe - 1]), &new[ne - 1], container, None);
            oe -= 1;
            ne -= 1;
        } else if same_key(&old[os], &new[ne - 1]) {
            renderer.patch(Some(&old[os]), &new[ne - 1], container, None);
            let after = renderer.next_host_sibling(&old[oe - 1]);
            renderer.move_to(&new[ne - 1], container, after);
            os += 1;
            ne -= 1;
        } else if same_key(&old[oe - 1], &new[ns]) {
            renderer.patch(Some(&old[oe - 1]), &new[ns], container, None);
            let before = renderer.first_host(&old[os]);
            renderer.move_to(&new[ns], container, before);
            oe -= 1;
            ns += 1;
        } else {
            let before = renderer.first_host(&old[os]);
            let found = (os..oe).find(|&i| !taken[i] && same_key(&old[i], &new[ns]));
            match found {
                Some(i) => {
                    renderer.patch(Some(&old[i]), &new[ns], container, None);
                    renderer.move_to(&new[ns], container, before);
                    taken[i] = true;
                }
                None => renderer.patch(None, &new[ns], container, before),
            }
            ns += 1;
        }
    }

    if ns < ne {
        let at = anchor_before(renderer, new, ne, anchor);
        for node in &new[ns..ne] {
            renderer.patch(None, node, container, at);
        }
    }
    for (node, taken) in old[os..oe].iter().zip(&taken[os..oe]) {
        if !taken {
            renderer.unmount(node);
        }
    }
}

fn diff_fast(
    renderer: &Renderer,
    old: &[VNode],
    new: &[VNode],
    container: HostNode,
    anchor: Option<HostNode>,
) {
    let mut start = 0;
    while start < old.len() && start < new.len() && same_key(&old[start], &new[start]) {
        renderer.patch(Some(&old[start]), &new[start], container, None);
        start += 1;
    }

    let (mut old_end, mut new_end) = (old.len(), new.len());
    while old_end > start && new_end > start && same_key(&old[old_end - 1], &new[new_end - 1]) {
        renderer.patch(Some(&old[old_end - 1]), &new[new_end - 1], container, None);
        old_end -= 1;
        new_end -= 1;
    }

    if start >= old_end {
        let at = anchor_before(renderer, new, new_end, anchor);
        for node in &new[start..new_end] {
            renderer.patch(None, node, container, at);
        }
        return;
    }
    if start >= new_end {
        for node in &old[start..old_end] {
            renderer.unmount(node);
        }
        return;
    }

    let count = new_end - start;
    let key_index: HashMap<&VKey, usize> = new[start..new_end]
        .iter()
        .enumerate()
        .filter_map(|(i, node)| node.key.as_ref().map(|key| (key, start + i)))
        .collect();

    // sources[i]: old position that supplied new[start + i].
    let mut sources: Vec<Option<usize>> = vec![None; count];
    let mut moved = false;
    let mut furthest = 0;
    let mut patched = 0;
    for (i, old_node) in old.iter().enumerate().take(old_end).skip(start) {
        if patched >= count {
            renderer.unmount(old_node);
            continue;
        }
        let found = old_node.key.as_ref().and_then(|key| key_index.get(key)).copied();
        match found {
            Some(k) => {
                renderer.patch(Some(old_node), &new[k], container, None);
                patched += 1;
                sources[k - start] = Some(i);
                if k < furthest {
                    moved = true;
                } else {
                    furthest = k;
                }
            }
            None => renderer.unmount(old_node),
        }
    }

    let stable = if moved {
        longest_increasing_subsequence(&sources)
    } else {
        Vec::new()
    };
    let mut stable = stable.into_iter().rev().peekable();
    for i in (0..count).rev() {
        let pos = start + i;
        let at = anchor_before(renderer, new, pos + 1, anchor);
        if sources[i].is_none() {
            renderer.patch(None, &new[pos], container, at);
        } else if moved {
            if stable.peek() == Some(&i) {
                stable.next();
            } else {
                renderer.move_to(&new[pos], container, at);
            }
        }
    }
    tracing::trace!(count, moved, "keyed diff");
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::render::renderer::RendererConfig;
    use crate::render::test_host::{HostOp, TestHost};

    const STRATEGIES: [DiffStrategy; 3] =
        [DiffStrategy::Simple, DiffStrategy::DoubleEnded, DiffStrategy::Fast];

    fn list(keys: &[i64]) -> VNode {
        VNode::element("ul").children(
            keys.iter()
                .map(|&key| VNode::element("li").key(key).child_text(key.to_string()))
                .collect(),
        )
    }

    fn run(strategy: DiffStrategy, from: &[i64], to: &[i64]) -> (Rc<TestHost>, HostNode) {
        let host = Rc::new(TestHost::new());
        let renderer = Renderer::new(host.clone(), RendererConfig::with_diff(strategy));
        let root = host.create_root("app");
        renderer.render(Some(list(from)), root);
        host.clear_ops();
        renderer.render(Some(list(to)), root);
        (host, root)
    }

    fn rendered(host: &TestHost, root: HostNode) -> Vec<String> {
        let ul = host.children(root)[0];
        host.children(ul).into_iter().map(|li| host.text_content(li)).collect()
    }

    fn expected(keys: &[i64]) -> Vec<String> {
        keys.iter().map(i64::to_string).collect()
    }

    #[test]
    fn reorder_moves_once() {
        for strategy in STRATEGIES {
            let (host, root) = run(strategy, &[1, 2, 3], &[2, 1, 3]);
            assert_eq!(rendered(&host, root), expected(&[2, 1, 3]), "{strategy:?}");
            assert_eq!(host.moves(), 1, "{strategy:?}");
            assert!(!host.ops().iter().any(|op| matches!(op, HostOp::Remove { .. })));
        }
    }

    #[test]
    fn insert_in_middle() {
        for strategy in STRATEGIES {
            let (host, root) = run(strategy, &[1, 2, 4], &[1, 2, 3, 4]);
            assert_eq!(rendered(&host, root), expected(&[1, 2, 3, 4]), "{strategy:?}");
            assert_eq!(host.moves(), 0, "{strategy:?}");
        }
    }

    #[test]
    fn remove_from_middle() {
        for strategy in STRATEGIES {
            let (host, root) = run(strategy, &[1, 2, 3, 4], &[1, 4]);
            assert_eq!(rendered(&host, root), expected(&[1, 4]), "{strategy:?}");
            let removed = host.ops().iter().filter(|op| matches!(op, HostOp::Remove { .. })).count();
            assert_eq!(removed, 2, "{strategy:?}");
        }
    }

    #[test]
    fn mixed_reorder_insert_remove() {
        for strategy in STRATEGIES {
            let (host, root) = run(strategy, &[1, 2, 3, 4, 6, 5], &[1, 3, 4, 2, 7, 5]);
            assert_eq!(rendered(&host, root), expected(&[1, 3, 4, 2, 7, 5]), "{strategy:?}");
        }
    }

    #[test]
    fn fast_diff_moves_only_off_sequence_nodes() {
        let (host, root) = run(DiffStrategy::Fast, &[1, 2, 3, 4, 5], &[1, 4, 2, 3, 5]);
        assert_eq!(rendered(&host, root), expected(&[1, 4, 2, 3, 5]));
        assert_eq!(host.moves(), 1);
    }

    #[test]
    fn unkeyed_lists_patch_by_position() {
        let host = Rc::new(TestHost::new());
        let renderer = Renderer::new(host.clone(), RendererConfig::default());
        let root = host.create_root("app");
        let view = |items: &[&str]| {
            VNode::element("ul").children(
                items.iter().map(|item| VNode::element("li").child_text(*item)).collect(),
            )
        };
        renderer.render(Some(view(&["a", "b", "c"])), root);
        renderer.render(Some(view(&["x", "y"])), root);
        assert_eq!(host.to_html(root), "<ul><li>x</li><li>y</li></ul>");
        renderer.render(Some(view(&["x", "y", "z"])), root);
        assert_eq!(host.to_html(root), "<ul><li>x</li><li>y</li><li>z</li></ul>");
    }
}
