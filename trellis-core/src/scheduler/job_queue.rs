//! Deduplicating job queue.
//!
//! Jobs are compared by pointer: queueing the same job twice before a flush
//! runs it once. The first job queued while idle schedules a single flush
//! microtask, so any number of synchronous triggers collapse into one
//! flush per checkpoint.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::map::Entry;
use indexmap::IndexMap;

use super::microtask::queue_microtask;

/// A unit of deferred work, identified by its allocation.
pub type Job = Rc<dyn Fn()>;

/// Queued jobs keyed by allocation address. A queued job is kept alive by
/// the map, so its address cannot be reused while it waits.
type JobSet = IndexMap<usize, Job>;

thread_local! {
    static JOBS: RefCell<JobSet> = RefCell::new(JobSet::new());
    static FLUSH_PENDING: Cell<bool> = const { Cell::new(false) };
}

fn job_id(job: &Job) -> usize {
    Rc::as_ptr(job).cast::<()>() as usize
}

/// Queue `job` for the next flush.
pub fn queue_job(job: Job) {
    let added = JOBS.with(|jobs| match jobs.borrow_mut().entry(job_id(&job)) {
        Entry::Occupied(_) => false,
        Entry::Vacant(slot) => {
            slot.insert(job);
            true
        }
    });
    if added && !FLUSH_PENDING.with(|pending| pending.replace(true)) {
        queue_microtask(flush_jobs);
    }
}

/// Whether a flush is scheduled.
pub fn is_flush_pending() -> bool {
    FLUSH_PENDING.with(Cell::get)
}

fn flush_jobs() {
    let mut ran = 0;
    loop {
        let jobs = JOBS.with(|jobs| std::mem::take(&mut *jobs.borrow_mut()));
        if jobs.is_empty() {
            break;
        }
        for job in jobs.into_values() {
            job();
            ran += 1;
        }
    }
    FLUSH_PENDING.with(|pending| pending.set(false));
    tracing::debug!(ran, "job queue flushed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{pending_microtasks, run_microtasks};

    #[test]
    fn same_job_runs_once_per_flush() {
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let job: Job = Rc::new(move || counter.set(counter.get() + 1));

        queue_job(job.clone());
        queue_job(job.clone());
        queue_job(job.clone());
        assert_eq!(pending_microtasks(), 1);
        assert!(is_flush_pending());

        run_microtasks();
        assert_eq!(count.get(), 1);
        assert!(!is_flush_pending());

        queue_job(job);
        run_microtasks();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn job_queued_during_flush_runs_in_same_flush() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_log = log.clone();
        let inner: Job = Rc::new(move || inner_log.borrow_mut().push("inner"));
        let outer_log = log.clone();
        let outer: Job = Rc::new(move || {
            outer_log.borrow_mut().push("outer");
            queue_job(inner.clone());
        });

        queue_job(outer);
        run_microtasks();
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
        assert!(!is_flush_pending());
    }

    #[test]
    fn distinct_jobs_run_in_queue_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b"] {
            let log = log.clone();
            queue_job(Rc::new(move || log.borrow_mut().push(name)));
        }
        run_microtasks();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }
}
