//! Microtask queue and local task executor.
//!
//! There is no event loop in this crate. Deferred work is queued here and
//! runs when the embedder (or a test) calls [`run_microtasks`], which plays
//! the role of "after the current synchronous task".
//!
//! Callbacks run in FIFO order. Futures spawned with [`spawn_local`] live on
//! a thread-local [`LocalPool`] that is run until stalled at every
//! checkpoint, interleaved with the callbacks until neither has work left.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;

use futures_executor::{LocalPool, LocalSpawner};
use futures_util::task::LocalSpawnExt;

struct Executor {
    callbacks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl Executor {
    fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            callbacks: RefCell::new(VecDeque::new()),
            pool: RefCell::new(pool),
            spawner,
        }
    }

    fn pop(&self) -> Option<Box<dyn FnOnce()>> {
        self.callbacks.borrow_mut().pop_front()
    }

    /// Poll every ready future. A checkpoint reached from inside a future
    /// skips the pool; the outer run picks up whatever it wakes.
    fn run_pool(&self) {
        match self.pool.try_borrow_mut() {
            Ok(mut pool) => pool.run_until_stalled(),
            Err(_) => tracing::trace!("microtask checkpoint inside a running task"),
        }
    }
}

thread_local! {
    static EXECUTOR: Executor = Executor::new();
}

/// Queue `f` to run at the next microtask checkpoint.
pub fn queue_microtask(f: impl FnOnce() + 'static) {
    EXECUTOR.with(|executor| executor.callbacks.borrow_mut().push_back(Box::new(f)));
}

/// Drive `future` to completion on the microtask executor.
pub fn spawn_local(future: impl Future<Output = ()> + 'static) {
    EXECUTOR.with(|executor| {
        if let Err(err) = executor.spawner.spawn_local(future) {
            tracing::warn!(%err, "failed to spawn local task");
        }
    });
}

/// Number of queued callbacks.
pub fn pending_microtasks() -> usize {
    EXECUTOR.with(|executor| executor.callbacks.borrow().len())
}

/// Run queued callbacks and ready futures until both are exhausted,
/// including work queued while running. Returns how many callbacks ran.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    loop {
        while let Some(callback) = EXECUTOR.with(Executor::pop) {
            callback();
            ran += 1;
        }
        EXECUTOR.with(Executor::run_pool);
        if pending_microtasks() == 0 {
            break;
        }
    }
    if ran > 0 {
        tracing::trace!(ran, "microtasks drained");
    }
    ran
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::task::Poll;

    use futures_util::future::poll_fn;

    use super::*;

    #[test]
    fn microtasks_run_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            queue_microtask(move || log.borrow_mut().push(i));
        }
        assert_eq!(pending_microtasks(), 3);
        assert!(log.borrow().is_empty());

        assert_eq!(run_microtasks(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn nested_microtasks_run_in_same_drain() {
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        queue_microtask(move || queue_microtask(move || flag.set(true)));
        run_microtasks();
        assert!(hit.get());
    }

    #[test]
    fn woken_tasks_are_polled_again() {
        let done = Rc::new(Cell::new(false));
        let flag = done.clone();
        let mut polls = 0;
        spawn_local(async move {
            poll_fn(|cx| {
                polls += 1;
                if polls < 3 {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                } else {
                    Poll::Ready(())
                }
            })
            .await;
            flag.set(true);
        });

        assert!(!done.get());
        run_microtasks();
        assert!(done.get());
    }

    #[test]
    fn task_queueing_a_callback_runs_it_in_same_checkpoint() {
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        spawn_local(async move {
            queue_microtask(move || flag.set(true));
        });
        run_microtasks();
        assert!(hit.get());
        assert_eq!(pending_microtasks(), 0);
    }
}
