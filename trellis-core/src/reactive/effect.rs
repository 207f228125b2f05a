//! Effect Implementation
//!
//! An effect is a computation that re-runs whenever the reactive data it
//! read during its last run changes.
//!
//! # How Effects Work
//!
//! 1. Unless created lazily, the effect runs its body immediately to
//!    establish initial dependencies.
//!
//! 2. Before every run, the effect removes itself from every dependency set
//!    it joined last time. Dependencies behind a branch that is no longer
//!    taken therefore disappear.
//!
//! 3. While the body runs, the effect sits on top of the context stack and
//!    every tracked read registers it.
//!
//! 4. When a dependency changes, the effect is handed to its scheduler if it
//!    has one, or re-run directly otherwise.
//!
//! An effect never re-runs itself while it is the active one. An effect
//! triggered while it runs further down the stack cannot re-enter its own
//! body; it runs once more as soon as that run returns.
//!
//! # Lazy effects
//!
//! A lazy effect is returned unexecuted. Computed values and watchers use
//! this to decide themselves when the first evaluation happens, and read the
//! body's return value through [`ReactiveEffect::run`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::runtime::Dep;
use super::subscriber::SubscriberId;

pub(crate) type EffectRef = Rc<EffectInner>;

/// Upper bound on back-to-back re-runs requested from nested effects.
const MAX_RERUNS: usize = 100;

/// Receives control instead of a direct re-run when a dependency changes.
pub type Scheduler = Rc<dyn Fn(&Subscriber)>;

/// Options accepted by [`effect`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,
    /// Called with the subscriber instead of re-running it.
    pub scheduler: Option<Scheduler>,
}

impl EffectOptions {
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: impl Fn(&Subscriber) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

pub(crate) struct EffectInner {
    id: SubscriberId,
    body: RefCell<Box<dyn FnMut()>>,
    /// Dependency sets this effect is currently registered in.
    deps: RefCell<SmallVec<[Weak<Dep>; 4]>>,
    scheduler: Option<Scheduler>,
    active: Cell<bool>,
    /// Triggered while running below the top of the stack.
    rerun: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectInner {
    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn record_dep(&self, dep: &Rc<Dep>) {
        self.deps.borrow_mut().push(Rc::downgrade(dep));
    }

    /// Run the body inside a fresh tracking context.
    pub(crate) fn run(self: &Rc<Self>) {
        if !self.active.get() {
            if let Ok(mut body) = self.body.try_borrow_mut() {
                (body)();
            }
            return;
        }

        if ReactiveContext::is_current(self.id) {
            tracing::trace!(subscriber = %self.id, "skipping recursive effect run");
            return;
        }

        let Ok(mut body) = self.body.try_borrow_mut() else {
            tracing::trace!(subscriber = %self.id, "effect running further down; deferring");
            self.rerun.set(true);
            return;
        };

        let mut runs = 0;
        loop {
            self.rerun.set(false);
            self.cleanup();
            {
                let _ctx = ReactiveContext::enter(self);
                (body)();
            }
            self.run_count.set(self.run_count.get() + 1);
            runs += 1;

            if !self.rerun.get() || !self.active.get() {
                break;
            }
            if runs >= MAX_RERUNS {
                tracing::warn!(subscriber = %self.id, runs, "effect keeps re-triggering itself; giving up");
                self.rerun.set(false);
                break;
            }
        }
    }

    /// Hand the effect to its scheduler, or run it.
    pub(crate) fn schedule(self: &Rc<Self>) {
        if !self.active.get() {
            return;
        }
        match &self.scheduler {
            Some(scheduler) => scheduler(&Subscriber {
                inner: Rc::clone(self),
            }),
            None => self.run(),
        }
    }

    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps {
            if let Some(dep) = dep.upgrade() {
                if let Ok(mut subscribers) = dep.try_borrow_mut() {
                    subscribers.shift_remove(&self.id);
                }
            }
        }
    }

    fn stop(&self) {
        if self.active.replace(false) {
            self.cleanup();
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// An untyped handle to an effect, as passed to schedulers.
#[derive(Clone)]
pub struct Subscriber {
    inner: EffectRef,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Re-run the effect, re-collecting its dependencies.
    pub fn run(&self) {
        self.inner.run();
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.inner.id).finish()
    }
}

/// A registered effect whose body returns `T`.
///
/// Cloning shares the same effect. The dependency store only holds effects
/// weakly: once every handle is gone the effect stops reacting.
#[must_use = "dropping the handle stops the effect"]
pub struct ReactiveEffect<T = ()> {
    core: EffectRef,
    output: Rc<RefCell<Option<T>>>,
}

/// Register `body` as an effect.
///
/// Without `options.lazy` the body runs once right away. The handle is
/// returned in both cases so the caller can run or stop it later.
#[must_use = "dropping the handle stops the effect"]
pub fn effect<T, F>(mut body: F, options: EffectOptions) -> ReactiveEffect<T>
where
    T: 'static,
    F: FnMut() -> T + 'static,
{
    let output = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&output);
    let core = Rc::new(EffectInner {
        id: SubscriberId::next(),
        body: RefCell::new(Box::new(move || {
            let value = body();
            *slot.borrow_mut() = Some(value);
        })),
        deps: RefCell::new(SmallVec::new()),
        scheduler: options.scheduler,
        active: Cell::new(true),
        rerun: Cell::new(false),
        run_count: Cell::new(0),
    });

    let effect = ReactiveEffect { core, output };
    if !options.lazy {
        effect.run();
    }
    effect
}

impl<T> ReactiveEffect<T> {
    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.core.id
    }

    /// Run the body and return its value.
    ///
    /// Returns `None` when the effect is already executing further up the
    /// stack; recursive runs are suppressed.
    pub fn run(&self) -> Option<T> {
        self.core.run();
        self.output.borrow_mut().take()
    }

    /// Detach the effect from every dependency; triggers no longer reach it.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub fn is_active(&self) -> bool {
        self.core.active.get()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.core.run_count.get()
    }

    /// Number of dependency sets the effect is registered in.
    pub fn dependency_count(&self) -> usize {
        self.core
            .deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    pub fn subscriber(&self) -> Subscriber {
        Subscriber {
            inner: Rc::clone(&self.core),
        }
    }
}

impl<T> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            output: Rc::clone(&self.output),
        }
    }
}

impl<T> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.core.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
