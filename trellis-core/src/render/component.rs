//! Component Host
//!
//! A component turns state into a subtree. Mounting one creates a
//! [`ComponentInstance`]: incoming props are split into declared props and
//! attrs, `data` becomes local reactive state, `setup` runs once, and the
//! render function is wrapped in an effect.
//!
//! # Updates
//!
//! The render effect never re-runs synchronously. Its scheduler queues the
//! instance's update job on the job queue, so any number of writes in one
//! tick produce a single re-render at the next microtask checkpoint. Props
//! written by a re-rendering parent reach the child the same way.
//!
//! # Lifecycle
//!
//! `on_*` hooks registered during `setup` run around mounting, updating and
//! unmounting. Hooks run untracked; reads inside them never subscribe the
//! render effect.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::reactive::{
    effect, proxy_refs, reactive, shallow_reactive, shallow_readonly, untracked, EffectOptions,
    ProxyRefs, Reactive, ReactiveEffect, Target, TargetData, Value,
};
use crate::scheduler::{queue_job, Job};

use super::host::HostNode;
use super::renderer::Renderer;
use super::vnode::{Children, Props, Slots, VNode, VNodeType};

/// Render function of a component.
pub type RenderFn = Rc<dyn Fn(&RenderContext<'_>) -> VNode>;

type SetupFn = Rc<dyn Fn(&Reactive, &SetupContext) -> SetupResult>;
type DataFn = Rc<dyn Fn() -> Target>;
type Hook = Rc<dyn Fn()>;

/// What `setup` hands back.
pub enum SetupResult {
    /// Nothing beyond side effects such as hook registration.
    None,
    /// A render function. It replaces any render function of the definition.
    Render(RenderFn),
    /// Extra state readable from the render context. Refs inside are
    /// unwrapped on read.
    State(Target),
}

impl SetupResult {
    pub fn render(render: impl Fn(&RenderContext<'_>) -> VNode + 'static) -> Self {
        Self::Render(Rc::new(render))
    }
}

/// A component definition, built once and shared by every instance.
pub struct ComponentDef {
    name: Rc<str>,
    props: Vec<Rc<str>>,
    data: Option<DataFn>,
    setup: Option<SetupFn>,
    render: Option<RenderFn>,
    functional: bool,
}

impl ComponentDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            props: Vec::new(),
            data: None,
            setup: None,
            render: None,
            functional: false,
        }
    }

    /// A stateless component that is only a render function. Without
    /// declared props every incoming prop is a prop.
    pub fn functional(name: &str, render: impl Fn(&RenderContext<'_>) -> VNode + 'static) -> Self {
        let mut def = Self::new(name).render(render);
        def.functional = true;
        def
    }

    /// Declare prop names. Anything else passed in lands in attrs.
    pub fn props<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.props.extend(names.into_iter().map(|name| Rc::from(name.as_ref())));
        self
    }

    /// Local state factory; called once per instance.
    pub fn data(mut self, data: impl Fn() -> Target + 'static) -> Self {
        self.data = Some(Rc::new(data));
        self
    }

    pub fn setup(mut self, setup: impl Fn(&Reactive, &SetupContext) -> SetupResult + 'static) -> Self {
        self.setup = Some(Rc::new(setup));
        self
    }

    pub fn render(mut self, render: impl Fn(&RenderContext<'_>) -> VNode + 'static) -> Self {
        self.render = Some(Rc::new(render));
        self
    }

    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_props(&self) -> &[Rc<str>] {
        &self.props
    }

    fn is_prop(&self, key: &str) -> bool {
        self.props.iter().any(|prop| &**prop == key)
            || is_handler_key(key)
            || (self.functional && self.props.is_empty())
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("functional", &self.functional)
            .finish()
    }
}

/// `onClick`-style keys hold event handlers.
fn is_handler_key(key: &str) -> bool {
    key.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase)
}

/// Prop key holding the handler of `event`: `change` becomes `onChange`.
fn handler_key(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_uppercase(), chars.as_str()),
        None => "on".to_owned(),
    }
}

/// Calls handlers passed in as `on*` props.
#[derive(Clone)]
pub struct Emitter {
    component: Rc<str>,
    props: Target,
}

impl Emitter {
    /// Invoke the handler of `event`. Returns false, with a warning, when the
    /// parent passed none.
    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        let key = handler_key(event);
        match self.props.get_raw(key.as_str()) {
            Value::Function(handler) => {
                handler.call(args);
                true
            }
            _ => {
                tracing::warn!(component = %self.component, event, "emitted event has no handler");
                false
            }
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").field("component", &self.component).finish()
    }
}

/// Second argument of `setup`.
pub struct SetupContext {
    pub attrs: Reactive,
    pub slots: Slots,
    emitter: Emitter,
}

impl SetupContext {
    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        self.emitter.emit(event, args)
    }

    /// An owned emitter for closures that outlive `setup`.
    pub fn emitter(&self) -> Emitter {
        self.emitter.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleHook {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Unmounted,
}

impl LifecycleHook {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        self as usize
    }
}

thread_local! {
    static CURRENT_INSTANCE: RefCell<Vec<Weak<ComponentInstance>>> = const { RefCell::new(Vec::new()) };
}

/// Marks an instance as the one whose `setup` is running.
struct SetupScope;

impl SetupScope {
    fn enter(instance: &Rc<ComponentInstance>) -> Self {
        CURRENT_INSTANCE.with(|stack| stack.borrow_mut().push(Rc::downgrade(instance)));
        Self
    }
}

impl Drop for SetupScope {
    fn drop(&mut self) {
        CURRENT_INSTANCE.with(|stack| stack.borrow_mut().pop());
    }
}

fn register_hook(kind: LifecycleHook, hook: Hook) {
    let current = CURRENT_INSTANCE.with(|stack| stack.borrow().last().and_then(Weak::upgrade));
    match current {
        Some(instance) => instance.hooks.borrow_mut()[kind.index()].push(hook),
        None => tracing::warn!(?kind, "lifecycle hooks can only be registered during setup"),
    }
}

pub fn on_before_mount(hook: impl Fn() + 'static) {
    register_hook(LifecycleHook::BeforeMount, Rc::new(hook));
}

pub fn on_mounted(hook: impl Fn() + 'static) {
    register_hook(LifecycleHook::Mounted, Rc::new(hook));
}

pub fn on_before_update(hook: impl Fn() + 'static) {
    register_hook(LifecycleHook::BeforeUpdate, Rc::new(hook));
}

pub fn on_updated(hook: impl Fn() + 'static) {
    register_hook(LifecycleHook::Updated, Rc::new(hook));
}

pub fn on_unmounted(hook: impl Fn() + 'static) {
    register_hook(LifecycleHook::Unmounted, Rc::new(hook));
}

/// What a render function reads from.
pub struct RenderContext<'a> {
    instance: &'a ComponentInstance,
}

impl RenderContext<'_> {
    /// Resolve `key` against local state, then props, then setup state.
    /// An unknown key is diagnosed and reads as undefined.
    pub fn get(&self, key: &str) -> Value {
        let instance = self.instance;
        if let Some(state) = instance.state.as_ref().filter(|state| state.raw().has_own(key)) {
            return state.get(key);
        }
        if instance.def.props.iter().any(|prop| &**prop == key) || instance.props.raw().has_own(key) {
            return instance.props.get(key);
        }
        if let Some(setup) = instance.setup_state.get().filter(|setup| setup.source().raw().has_own(key)) {
            return setup.get(key);
        }
        tracing::warn!(component = %instance.def.name, key, "render context key not found");
        Value::Undefined
    }

    /// Write local or setup state. Props cannot be written from inside.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let instance = self.instance;
        if let Some(state) = instance.state.as_ref().filter(|state| state.raw().has_own(key)) {
            state.set(key, value);
            return true;
        }
        if instance.props.raw().has_own(key) {
            tracing::warn!(component = %instance.def.name, key, "props are readonly");
            return false;
        }
        if let Some(setup) = instance.setup_state.get().filter(|setup| setup.source().raw().has_own(key)) {
            setup.set(key, value);
            return true;
        }
        tracing::warn!(component = %instance.def.name, key, "render context key not found");
        false
    }

    pub fn props(&self) -> &Reactive {
        &self.instance.props
    }

    pub fn attrs(&self) -> &Reactive {
        &self.instance.attrs
    }

    /// Render the slot `name`, if the parent passed one.
    pub fn slot(&self, name: &str) -> Option<VNode> {
        let slot = self.instance.slots.borrow().get(name).cloned();
        slot.map(|slot| slot())
    }

    pub fn slots(&self) -> Slots {
        self.instance.slots.borrow().clone()
    }

    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        self.instance.emitter().emit(event, args)
    }
}

/// A mounted component.
pub struct ComponentInstance {
    def: Rc<ComponentDef>,
    state: Option<Reactive>,
    props: Reactive,
    attrs: Reactive,
    slots: RefCell<Slots>,
    setup_state: OnceCell<ProxyRefs>,
    render: OnceCell<RenderFn>,
    hooks: RefCell<[Vec<Hook>; LifecycleHook::COUNT]>,
    sub_tree: RefCell<Option<VNode>>,
    effect: OnceCell<ReactiveEffect>,
    job: OnceCell<Job>,
    mounted: Cell<bool>,
    unmounted: Cell<bool>,
    container: Cell<HostNode>,
    anchor: Cell<Option<HostNode>>,
}

fn split_props(def: &ComponentDef, raw: &Props) -> (Target, Target) {
    let (props, attrs): (Vec<_>, Vec<_>) = raw
        .iter()
        .map(|(key, value)| (Rc::clone(key), value.clone()))
        .partition(|(key, _)| def.is_prop(key));
    (Target::from_entries(props), Target::from_entries(attrs))
}

fn own_keys(target: &Target) -> Vec<Rc<str>> {
    match target.snapshot() {
        TargetData::Object(fields) => fields.into_keys().collect(),
        _ => Vec::new(),
    }
}

impl ComponentInstance {
    fn create(def: &Rc<ComponentDef>, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) -> Rc<Self> {
        let (props, attrs) = split_props(def, &vnode.props);
        let state = def.data.as_ref().map(|data| reactive(&untracked(|| data())));
        let slots = match &vnode.children {
            Children::Slots(slots) => slots.clone(),
            _ => Slots::new(),
        };

        let instance = Rc::new(Self {
            def: Rc::clone(def),
            state,
            props: shallow_reactive(&props),
            attrs: shallow_reactive(&attrs),
            slots: RefCell::new(slots),
            setup_state: OnceCell::new(),
            render: OnceCell::new(),
            hooks: RefCell::new(Default::default()),
            sub_tree: RefCell::new(None),
            effect: OnceCell::new(),
            job: OnceCell::new(),
            mounted: Cell::new(false),
            unmounted: Cell::new(false),
            container: Cell::new(container),
            anchor: Cell::new(anchor),
        });
        instance.run_setup();
        instance
    }

    fn run_setup(self: &Rc<Self>) {
        let mut render = self.def.render.clone();
        if let Some(setup) = self.def.setup.clone() {
            let context = SetupContext {
                attrs: shallow_readonly(&self.attrs.raw()),
                slots: self.slots.borrow().clone(),
                emitter: self.emitter(),
            };
            let props = shallow_readonly(&self.props.raw());
            let result = {
                let _scope = SetupScope::enter(self);
                untracked(|| setup(&props, &context))
            };
            match result {
                SetupResult::Render(returned) => {
                    if render.is_some() {
                        tracing::warn!(
                            component = %self.def.name,
                            "setup returned a render function; the render option is ignored"
                        );
                    }
                    render = Some(returned);
                }
                SetupResult::State(state) => {
                    let _ = self.setup_state.set(proxy_refs(&shallow_reactive(&state)));
                }
                SetupResult::None => {}
            }
        }

        let render = render.unwrap_or_else(|| {
            tracing::warn!(component = %self.def.name, "component has no render function");
            Rc::new(|_: &RenderContext<'_>| VNode::comment(""))
        });
        let _ = self.render.set(render);
    }

    fn setup_render_effect(self: &Rc<Self>, renderer: &Renderer) {
        let target = Rc::downgrade(self);
        let job: Job = Rc::new(move || {
            if let Some(instance) = target.upgrade() {
                instance.update();
            }
        });
        let _ = self.job.set(job);

        let (target, weak_renderer) = (Rc::downgrade(self), renderer.downgrade());
        let scheduled = Rc::downgrade(self);
        let runner = effect(
            move || {
                if let (Some(instance), Some(renderer)) = (target.upgrade(), weak_renderer.upgrade()) {
                    instance.render_cycle(&renderer);
                }
            },
            EffectOptions::lazy().with_scheduler(move |_| {
                if let Some(instance) = scheduled.upgrade() {
                    instance.queue_update();
                }
            }),
        );
        let _ = self.effect.set(runner);
        self.update();
    }

    fn render_cycle(&self, renderer: &Renderer) {
        let Some(render) = self.render.get().cloned() else {
            return;
        };
        let tree = render(&RenderContext { instance: self });

        if !self.mounted.get() {
            self.run_hooks(LifecycleHook::BeforeMount);
            renderer.patch(None, &tree, self.container.get(), self.anchor.get());
            *self.sub_tree.borrow_mut() = Some(tree);
            self.mounted.set(true);
            tracing::debug!(component = %self.def.name, "component mounted");
            self.run_hooks(LifecycleHook::Mounted);
        } else {
            self.run_hooks(LifecycleHook::BeforeUpdate);
            let previous = self.sub_tree.borrow_mut().take();
            let container = previous
                .as_ref()
                .and_then(|tree| renderer.first_host(tree))
                .and_then(|node| renderer.host().parent(node))
                .unwrap_or(self.container.get());
            self.container.set(container);
            renderer.patch(previous.as_ref(), &tree, container, None);
            *self.sub_tree.borrow_mut() = Some(tree);
            tracing::debug!(component = %self.def.name, "component updated");
            self.run_hooks(LifecycleHook::Updated);
        }
    }

    fn run_hooks(&self, kind: LifecycleHook) {
        let hooks = self.hooks.borrow()[kind.index()].clone();
        for hook in hooks {
            untracked(&*hook);
        }
    }

    /// Re-render now, unless unmounted.
    pub fn update(&self) {
        if self.unmounted.get() {
            return;
        }
        if let Some(runner) = self.effect.get() {
            runner.run();
        }
    }

    /// Queue a re-render for the next flush.
    pub fn queue_update(&self) {
        if let Some(job) = self.job.get() {
            queue_job(Rc::clone(job));
        }
    }

    fn update_props(&self, raw: &Props) {
        let (props, attrs) = split_props(&self.def, raw);
        untracked(|| {
            sync_fields(&self.props, &props);
            sync_fields(&self.attrs, &attrs);
        });
    }

    pub(crate) fn unmount(&self, renderer: &Renderer, remove: bool) {
        if self.unmounted.replace(true) {
            return;
        }
        if let Some(runner) = self.effect.get() {
            runner.stop();
        }
        let tree = self.sub_tree.borrow_mut().take();
        if let Some(tree) = tree {
            renderer.unmount_with(&tree, remove);
        }
        tracing::debug!(component = %self.def.name, "component unmounted");
        self.run_hooks(LifecycleHook::Unmounted);
    }

    pub(crate) fn with_sub_tree<R>(&self, f: impl FnOnce(&VNode) -> R) -> Option<R> {
        self.sub_tree.borrow().as_ref().map(f)
    }

    /// The tree produced by the last render.
    pub fn sub_tree(&self) -> Option<VNode> {
        self.sub_tree.borrow().clone()
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn state(&self) -> Option<&Reactive> {
        self.state.as_ref()
    }

    pub fn props(&self) -> &Reactive {
        &self.props
    }

    pub fn attrs(&self) -> &Reactive {
        &self.attrs
    }

    pub fn emitter(&self) -> Emitter {
        Emitter {
            component: Rc::clone(&self.def.name),
            props: self.props.raw(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get() && !self.unmounted.get()
    }

    /// Number of times the render function ran.
    pub fn render_count(&self) -> usize {
        self.effect.get().map_or(0, ReactiveEffect::run_count)
    }
}

/// Make the fields of `wrapper` equal to those of `next`, writing through
/// the wrapper so that readers are triggered.
fn sync_fields(wrapper: &Reactive, next: &Target) {
    let next_keys = own_keys(next);
    for key in &next_keys {
        wrapper.set(&**key, next.get_raw(&**key));
    }
    for key in own_keys(&wrapper.raw()) {
        if !next_keys.contains(&key) {
            wrapper.delete(&*key);
        }
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.def.name)
            .field("mounted", &self.mounted.get())
            .field("unmounted", &self.unmounted.get())
            .finish()
    }
}

impl Renderer {
    pub(crate) fn mount_component(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let VNodeType::Component(def) = &vnode.node_type else {
            return;
        };
        let instance = ComponentInstance::create(def, vnode, container, anchor);
        vnode.set_component(Some(Rc::clone(&instance)));
        instance.setup_render_effect(self);
    }

    pub(crate) fn patch_component(&self, old: &VNode, new: &VNode) {
        let Some(instance) = old.component_instance() else {
            tracing::warn!(?old, "patching a component that was never mounted");
            return;
        };
        new.set_component(Some(Rc::clone(&instance)));
        instance.update_props(&new.props);
        if let Children::Slots(slots) = &new.children {
            *instance.slots.borrow_mut() = slots.clone();
            instance.queue_update();
        }
    }
}
