//! Rendering
//!
//! This module turns abstract trees into host operations.
//!
//! # Concepts
//!
//! ## Abstract trees
//!
//! A [`VNode`] is a cheap description of an element, a text or comment
//! node, a fragment, a component or a special node such as a [`Teleport`].
//! Render functions build a fresh tree on every run.
//!
//! ## Reconciliation
//!
//! The [`Renderer`] diffs the new tree against the previous one and applies
//! the difference through a [`HostOps`] implementation. Keyed child lists
//! are reconciled with one of three [`DiffStrategy`] variants.
//!
//! ## Components
//!
//! A component owns local state and a render effect. State changes queue a
//! re-render on the job queue; the next microtask checkpoint patches the
//! component's subtree in place.

mod async_component;
mod children;
mod component;
mod host;
mod lis;
mod renderer;
mod teleport;
mod test_host;
mod vnode;

pub use async_component::{
    define_async_component, AsyncComponentOptions, ErrorAction, ErrorHandler, Loader,
};
pub use component::{
    on_before_mount, on_before_update, on_mounted, on_unmounted, on_updated, ComponentDef,
    ComponentInstance, Emitter, RenderContext, RenderFn, SetupContext, SetupResult,
};
pub use host::{HostNode, HostOps};
pub use lis::longest_increasing_subsequence;
pub use renderer::{DiffStrategy, Renderer, RendererConfig, SpecialNode};
pub use teleport::Teleport;
pub use test_host::{HostOp, TestHost};
pub use vnode::{ChildPath, Children, PatchFlag, Props, Slot, Slots, VKey, VNode, VNodeType};
