//! Integration Tests for Reconciliation
//!
//! These tests render keyed lists through a recording host and check the
//! resulting tree and operation log for every diff strategy.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use proptest::prelude::*;
use proptest::sample::subsequence;

use trellis_core::render::{
    longest_increasing_subsequence, DiffStrategy, HostNode, HostOp, Renderer, RendererConfig,
    TestHost, VNode,
};

const STRATEGIES: [DiffStrategy; 3] =
    [DiffStrategy::Simple, DiffStrategy::DoubleEnded, DiffStrategy::Fast];

fn item(key: u32) -> VNode {
    VNode::element("li").key(key as i64).child_text(key.to_string())
}

fn list(keys: &[u32]) -> VNode {
    VNode::element("ul").children(keys.iter().copied().map(item).collect())
}

struct Harness {
    host: Rc<TestHost>,
    renderer: Renderer,
    root: HostNode,
}

impl Harness {
    fn new(strategy: DiffStrategy) -> Self {
        let host = Rc::new(TestHost::new());
        let renderer = Renderer::new(host.clone(), RendererConfig::with_diff(strategy));
        let root = host.create_root("app");
        Self { host, renderer, root }
    }

    fn render(&self, vnode: VNode) {
        self.renderer.render(Some(vnode), self.root);
    }

    fn items(&self) -> Vec<HostNode> {
        let ul = self.host.children(self.root)[0];
        self.host.children(ul)
    }

    fn keys(&self) -> Vec<u32> {
        self.items()
            .into_iter()
            .filter_map(|li| self.host.text_content(li).parse().ok())
            .collect()
    }

    /// Host node of every rendered item, by key.
    fn nodes_by_key(&self) -> HashMap<u32, HostNode> {
        self.keys().into_iter().zip(self.items()).collect()
    }

    fn created_items(&self) -> usize {
        self.host
            .count_ops(|op| matches!(op, HostOp::CreateElement { tag, .. } if tag == "li"))
    }

    fn removals(&self) -> usize {
        self.host.count_ops(|op| matches!(op, HostOp::Remove { .. }))
    }
}

/// Two distinct-key lists drawn from a small key space so they overlap.
fn key_lists() -> impl Strategy<Value = (Vec<u32>, Vec<u32>)> {
    let keys: Vec<u32> = (0..16).collect();
    (
        subsequence(keys.clone(), 0..=16).prop_shuffle(),
        subsequence(keys, 0..=16).prop_shuffle(),
    )
}

proptest! {
    /// Any keyed patch yields the new key order, mounting and unmounting
    /// exactly the keys that differ and reusing the rest.
    #[test]
    fn keyed_diff_matches_new_order((old, new) in key_lists()) {
        for strategy in STRATEGIES {
            let harness = Harness::new(strategy);
            harness.render(list(&old));
            let before = harness.nodes_by_key();
            harness.host.clear_ops();

            harness.render(list(&new));

            let old_set: HashSet<u32> = old.iter().copied().collect();
            let new_set: HashSet<u32> = new.iter().copied().collect();
            prop_assert_eq!(harness.keys(), new.clone(), "{:?}", strategy);
            prop_assert_eq!(harness.removals(), old_set.difference(&new_set).count());
            prop_assert_eq!(harness.created_items(), new_set.difference(&old_set).count());

            let after = harness.nodes_by_key();
            for key in old_set.intersection(&new_set) {
                prop_assert_eq!(before[key], after[key], "key {} was remounted", key);
            }
        }
    }

    /// Patching a list against an identical copy moves nothing.
    #[test]
    fn identical_lists_move_nothing((keys, _) in key_lists()) {
        for strategy in STRATEGIES {
            let harness = Harness::new(strategy);
            harness.render(list(&keys));
            harness.host.clear_ops();

            harness.render(list(&keys));
            prop_assert_eq!(harness.host.moves(), 0);
            prop_assert_eq!(harness.removals(), 0);
            prop_assert_eq!(harness.created_items(), 0);
        }
    }

    /// The fast strategy moves only nodes outside a longest increasing run.
    #[test]
    fn fast_diff_moves_are_minimal((old, new) in key_lists()) {
        let harness = Harness::new(DiffStrategy::Fast);
        harness.render(list(&old));
        harness.host.clear_ops();
        harness.render(list(&new));

        let old_pos: HashMap<u32, usize> = old.iter().enumerate().map(|(i, k)| (*k, i)).collect();
        let sources: Vec<Option<usize>> = new.iter().map(|k| old_pos.get(k).copied()).collect();
        let common = sources.iter().flatten().count();
        let stable = longest_increasing_subsequence(&sources).len();
        prop_assert_eq!(harness.host.moves(), common - stable);
    }
}

/// A pure reorder `[1:p, 2:div, 3:span] -> [2:div, 1:p, 3:span]` is one move.
#[test]
fn reorder_only_needs_one_move() {
    let tree = |order: &[(u32, &str)], suffix: &str| {
        VNode::element("section").children(
            order
                .iter()
                .map(|(key, tag)| VNode::element(tag).key(*key as i64).child_text(format!("{key}{suffix}")))
                .collect(),
        )
    };

    for strategy in STRATEGIES {
        let harness = Harness::new(strategy);
        harness.render(tree(&[(1, "p"), (2, "div"), (3, "span")], ""));
        harness.host.clear_ops();

        harness.render(tree(&[(2, "div"), (1, "p"), (3, "span")], "'"));

        let tags: Vec<_> = harness
            .items()
            .into_iter()
            .filter_map(|node| harness.host.tag(node))
            .collect();
        assert_eq!(tags, ["div", "p", "span"], "{strategy:?}");
        assert_eq!(harness.host.moves(), 1, "{strategy:?}");
        assert_eq!(harness.removals(), 0);
        assert_eq!(
            harness.host.count_ops(|op| matches!(op, HostOp::CreateElement { .. })),
            0
        );
        assert_eq!(harness.host.to_html(harness.root), "<section><div>2'</div><p>1'</p><span>3'</span></section>");
    }
}

/// Unkeyed lists are patched in place by position.
#[test]
fn unkeyed_children_patch_in_place() {
    let harness = Harness::new(DiffStrategy::Fast);
    let unkeyed = |texts: &[&str]| {
        VNode::element("ul")
            .children(texts.iter().map(|text| VNode::element("li").child_text(*text)).collect())
    };

    harness.render(unkeyed(&["a", "b", "c"]));
    let first = harness.items();
    harness.host.clear_ops();

    harness.render(unkeyed(&["x", "y"]));
    assert_eq!(harness.items(), first[..2]);
    assert_eq!(harness.removals(), 1);
    assert_eq!(harness.host.moves(), 0);
    assert_eq!(harness.host.to_html(harness.root), "<ul><li>x</li><li>y</li></ul>");
}

/// The diff strategy can be chosen from JSON configuration.
#[test]
fn strategy_from_json_config() {
    let config = RendererConfig::from_json(r#"{ "diff": "double_ended" }"#).unwrap();
    assert_eq!(config.diff, DiffStrategy::DoubleEnded);

    let config = RendererConfig::from_json("{}").unwrap();
    assert_eq!(config.diff, DiffStrategy::Fast);
}

/// Rendering `None` unmounts the root.
#[test]
fn render_none_clears_container() {
    let harness = Harness::new(DiffStrategy::Fast);
    harness.render(list(&[1, 2, 3]));
    assert!(harness.renderer.has_root(harness.root));

    harness.renderer.render(None, harness.root);
    assert!(!harness.renderer.has_root(harness.root));
    assert!(harness.host.children(harness.root).is_empty());
}
