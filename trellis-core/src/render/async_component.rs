//! Async components.
//!
//! [`define_async_component`] wraps a loader future in a regular component.
//! The wrapper renders a loading component (or nothing) until the loader
//! resolves, then the loaded component with every prop, attr and slot
//! forwarded. A failed load is offered to `on_error`, which may retry; a
//! final failure renders the error component with the message as its
//! `error` prop, or an empty placeholder when there is none.
//!
//! The loader runs on the microtask executor. There is no clock here, so
//! loading delays and timeouts are left to the loader itself.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;

use crate::error::LoadError;
use crate::reactive::{shallow_ref, Ref, Value};
use crate::scheduler::spawn_local;

use super::component::{ComponentDef, RenderContext, SetupResult};
use super::vnode::{Children, VNode};

pub type Loader = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<Rc<ComponentDef>, LoadError>>>;

/// Decision of an `on_error` handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    Retry,
    Fail,
}

/// Called with the error and the number of retries so far.
pub type ErrorHandler = Rc<dyn Fn(&LoadError, u32) -> ErrorAction>;

#[derive(Clone)]
pub struct AsyncComponentOptions {
    pub loader: Loader,
    pub loading_component: Option<Rc<ComponentDef>>,
    pub error_component: Option<Rc<ComponentDef>>,
    pub on_error: Option<ErrorHandler>,
}

impl AsyncComponentOptions {
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = Result<Rc<ComponentDef>, LoadError>> + 'static,
    {
        Self {
            loader: Rc::new(move || loader().boxed_local()),
            loading_component: None,
            error_component: None,
            on_error: None,
        }
    }

    pub fn loading_component(mut self, def: &Rc<ComponentDef>) -> Self {
        self.loading_component = Some(Rc::clone(def));
        self
    }

    pub fn error_component(mut self, def: &Rc<ComponentDef>) -> Self {
        self.error_component = Some(Rc::clone(def));
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&LoadError, u32) -> ErrorAction + 'static) -> Self {
        self.on_error = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for AsyncComponentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncComponentOptions")
            .field("loading_component", &self.loading_component)
            .field("error_component", &self.error_component)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

async fn load(options: AsyncComponentOptions) -> Result<Rc<ComponentDef>, LoadError> {
    let mut retries = 0;
    loop {
        let err = match (options.loader)().await {
            Ok(def) => return Ok(def),
            Err(err) => err,
        };
        let action = options
            .on_error
            .as_ref()
            .map_or(ErrorAction::Fail, |handler| handler(&err, retries));
        if action == ErrorAction::Fail {
            return Err(err);
        }
        retries += 1;
        tracing::debug!(retries, %err, "retrying component load");
    }
}

/// Copy props, attrs and slots of the wrapper onto the loaded component.
fn forward(ctx: &RenderContext<'_>, def: &Rc<ComponentDef>) -> VNode {
    let mut vnode = VNode::component(def);
    for (key, value) in ctx.attrs().entries().into_iter().chain(ctx.props().entries()) {
        if let Some(key) = key.as_str() {
            vnode = vnode.prop(key, value);
        }
    }
    let slots = ctx.slots();
    if !slots.is_empty() {
        vnode = vnode.with_children(Children::Slots(slots));
    }
    vnode
}

pub fn define_async_component(options: AsyncComponentOptions) -> Rc<ComponentDef> {
    ComponentDef::new("AsyncComponentWrapper")
        .setup(move |_, _| {
            let loaded: Rc<RefCell<Option<Rc<ComponentDef>>>> = Rc::new(RefCell::new(None));
            let status = Ref::new("loading");
            let error = shallow_ref(Value::Null);

            spawn_local({
                let (options, loaded, status, error) =
                    (options.clone(), Rc::clone(&loaded), status.clone(), error.clone());
                async move {
                    match load(options).await {
                        Ok(def) => {
                            *loaded.borrow_mut() = Some(def);
                            status.set("loaded");
                        }
                        Err(err) => {
                            tracing::warn!(%err, "async component failed to load");
                            error.set(err.message());
                            status.set("error");
                        }
                    }
                }
            });

            let (loading_component, error_component) =
                (options.loading_component.clone(), options.error_component.clone());
            SetupResult::render(move |ctx| {
                let status = status.get();
                match status.as_str() {
                    Some("loaded") => match loaded.borrow().as_ref() {
                        Some(def) => forward(ctx, def),
                        None => VNode::text(""),
                    },
                    Some("error") => match &error_component {
                        Some(def) => VNode::component(def).prop("error", error.get()),
                        None => VNode::text(""),
                    },
                    _ => match &loading_component {
                        Some(def) => VNode::component(def),
                        None => VNode::text(""),
                    },
                }
            })
        })
        .build()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use futures_util::future::ready;

    use super::*;
    use crate::render::renderer::{Renderer, RendererConfig};
    use crate::render::test_host::TestHost;
    use crate::render::HostNode;
    use crate::scheduler::run_microtasks;

    fn setup() -> (Rc<TestHost>, Renderer, HostNode) {
        let host = Rc::new(TestHost::new());
        let renderer = Renderer::new(host.clone(), RendererConfig::default());
        let root = host.create_root("app");
        (host, renderer, root)
    }

    fn greeting() -> Rc<ComponentDef> {
        ComponentDef::new("Greeting")
            .props(["name"])
            .render(|ctx| VNode::element("p").child_text(format!("hello {}", ctx.get("name"))))
            .build()
    }

    #[test]
    fn renders_loaded_component_with_props() {
        let (host, renderer, root) = setup();
        let loading = ComponentDef::new("Loading")
            .render(|_| VNode::element("i").child_text("loading"))
            .build();
        let def = greeting();
        let wrapper = define_async_component(
            AsyncComponentOptions::new(move || ready(Ok(Rc::clone(&def)))).loading_component(&loading),
        );

        renderer.render(Some(VNode::component(&wrapper).prop("name", "ada")), root);
        assert_eq!(host.to_html(root), "<i>loading</i>");

        run_microtasks();
        assert_eq!(host.to_html(root), "<p>hello ada</p>");
    }

    #[test]
    fn failure_renders_error_component() {
        let (host, renderer, root) = setup();
        let error_view = ComponentDef::new("Error")
            .props(["error"])
            .render(|ctx| VNode::element("b").child_text(ctx.get("error").to_string()))
            .build();
        let wrapper = define_async_component(
            AsyncComponentOptions::new(|| ready(Err(LoadError::Failed("offline".into()))))
                .error_component(&error_view),
        );

        renderer.render(Some(VNode::component(&wrapper)), root);
        run_microtasks();
        assert_eq!(host.to_html(root), "<b>offline</b>");
    }

    #[test]
    fn failure_without_error_component_is_empty() {
        let (host, renderer, root) = setup();
        let wrapper = define_async_component(AsyncComponentOptions::new(|| {
            ready(Err(LoadError::Failed("offline".into())))
        }));
        renderer.render(Some(VNode::component(&wrapper)), root);
        run_microtasks();
        assert_eq!(host.to_html(root), "");
    }

    #[test]
    fn on_error_retries() {
        let (host, renderer, root) = setup();
        let attempts = Rc::new(Cell::new(0));
        let counter = attempts.clone();
        let def = greeting();
        let wrapper = define_async_component(
            AsyncComponentOptions::new(move || {
                counter.set(counter.get() + 1);
                if counter.get() < 3 {
                    ready(Err(LoadError::Failed("flaky".into())))
                } else {
                    ready(Ok(Rc::clone(&def)))
                }
            })
            .on_error(|_, retries| if retries < 5 { ErrorAction::Retry } else { ErrorAction::Fail }),
        );

        renderer.render(Some(VNode::component(&wrapper).prop("name", "bob")), root);
        run_microtasks();
        assert_eq!(attempts.get(), 3);
        assert_eq!(host.to_html(root), "<p>hello bob</p>");
    }
}
