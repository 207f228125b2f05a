//! Integration Tests for Components
//!
//! These tests mount component trees through a recording host and drive
//! them with state changes, host events and microtask checkpoints.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use trellis_core::reactive::{Callback, Ref, Target, Value};
use trellis_core::render::{
    on_mounted, on_unmounted, ComponentDef, HostNode, HostOp, Renderer, RendererConfig,
    SetupResult, Teleport, TestHost, VNode,
};
use trellis_core::scheduler::run_microtasks;

fn setup() -> (Rc<TestHost>, Renderer, HostNode) {
    let host = Rc::new(TestHost::new());
    let renderer = Renderer::new(host.clone(), RendererConfig::default());
    let root = host.create_root("app");
    (host, renderer, root)
}

fn item_def() -> Rc<ComponentDef> {
    ComponentDef::new("Item")
        .props(["label"])
        .render(|ctx| VNode::element("li").child_text(ctx.get("label").to_string()))
        .build()
}

/// A list component re-renders from array mutations and keeps the child
/// instances of surviving items.
#[test]
fn list_follows_array_mutations() {
    let (host, renderer, root) = setup();
    let item = item_def();
    let list = ComponentDef::new("List")
        .data(|| Target::from_json(json!({ "items": ["a", "b"] })))
        .render(move |ctx| {
            let items = match ctx.get("items") {
                Value::Reactive(items) => items.values(),
                _ => Vec::new(),
            };
            VNode::element("ul").children(
                items
                    .into_iter()
                    .map(|label| {
                        let key = label.to_string();
                        VNode::component(&item).key(key).prop("label", label)
                    })
                    .collect(),
            )
        })
        .build();

    let vnode = VNode::component(&list);
    renderer.patch(None, &vnode, root, None);
    assert_eq!(host.to_html(root), "<ul><li>a</li><li>b</li></ul>");

    let instance = vnode.component_instance().unwrap();
    let Value::Reactive(items) = instance.state().unwrap().get("items") else {
        panic!("items should be observed");
    };
    let ul = host.children(root)[0];
    let b_node = host.children(ul)[1];

    items.push("c");
    items.shift();
    run_microtasks();

    assert_eq!(host.to_html(root), "<ul><li>b</li><li>c</li></ul>");
    assert_eq!(host.children(ul)[0], b_node);
    assert_eq!(instance.render_count(), 2);
}

/// A host event handler writes state and the next checkpoint re-renders.
#[test]
fn click_updates_counter() {
    let (host, renderer, root) = setup();
    let def = ComponentDef::new("Counter")
        .setup(|_, _| {
            let count = Ref::new(0);
            SetupResult::render(move |_| {
                let clicks = count.clone();
                VNode::element("button")
                    .prop(
                        "onClick",
                        Callback::handler(move |_| clicks.set(clicks.get_untracked().as_f64() + 1.0)),
                    )
                    .child_text(count.get().to_string())
            })
        })
        .build();

    renderer.render(Some(VNode::component(&def)), root);
    let button = host.children(root)[0];
    assert_eq!(host.text_content(button), "0");

    assert!(host.dispatch(button, "click", &[]));
    assert!(host.dispatch(button, "click", &[]));
    assert_eq!(host.text_content(button), "0");

    run_microtasks();
    assert_eq!(host.text_content(button), "2");
    assert_eq!(
        host.count_ops(|op| matches!(op, HostOp::AddListener { .. })),
        1,
        "handler swaps must reuse the listener"
    );
}

/// Child state changes re-render only the child.
#[test]
fn child_update_leaves_parent_alone() {
    let (host, renderer, root) = setup();
    let child_state = Rc::new(RefCell::new(None));
    let capture = child_state.clone();
    let child = ComponentDef::new("Child")
        .data(|| Target::from_json(json!({ "n": 1 })))
        .setup(move |_, _| {
            on_mounted({
                let capture = capture.clone();
                move || *capture.borrow_mut() = Some(())
            });
            SetupResult::None
        })
        .render(|ctx| VNode::element("em").child_text(ctx.get("n").to_string()))
        .build();
    let parent_renders = Rc::new(Cell::new(0));
    let counter = parent_renders.clone();
    let parent = ComponentDef::new("Parent")
        .render(move |_| {
            counter.set(counter.get() + 1);
            VNode::element("div").children(vec![VNode::component(&child)])
        })
        .build();

    let vnode = VNode::component(&parent);
    renderer.patch(None, &vnode, root, None);
    assert!(child_state.borrow().is_some());

    let parent_instance = vnode.component_instance().unwrap();
    let child_vnode = parent_instance.sub_tree().unwrap().children.nodes()[0].clone();
    let child_instance = child_vnode.component_instance().unwrap();

    child_instance.state().unwrap().set("n", 2);
    run_microtasks();

    assert_eq!(host.to_html(root), "<div><em>2</em></div>");
    assert_eq!(parent_renders.get(), 1);
}

/// Teleported content renders into its target and leaves with its owner.
#[test]
fn teleport_inside_component() {
    let (host, renderer, root) = setup();
    let modal = host.create_root("modal");
    let unmounted = Rc::new(Cell::new(false));
    let flag = unmounted.clone();
    let def = ComponentDef::new("Dialog")
        .setup(move |_, _| {
            let flag = flag.clone();
            on_unmounted(move || flag.set(true));
            SetupResult::None
        })
        .render(|_| {
            VNode::element("main").children(vec![Teleport::vnode(
                "#modal",
                vec![VNode::element("dialog").child_text("hi")],
            )])
        })
        .build();

    renderer.render(Some(VNode::component(&def)), root);
    assert_eq!(host.to_html(modal), "<dialog>hi</dialog>");
    assert_eq!(host.to_html(root), "<main><!--teleport--></main>");

    renderer.render(None, root);
    assert!(unmounted.get());
    assert_eq!(host.to_html(modal), "");
    assert_eq!(host.to_html(root), "");
}
