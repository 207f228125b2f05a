//! Deferred execution.
//!
//! Everything here is single-threaded and cooperative. Work deferred to a
//! "microtask" runs when [`run_microtasks`] is called; nothing blocks and
//! nothing runs on another thread.

mod job_queue;
mod microtask;

pub use job_queue::{is_flush_pending, queue_job, Job};
pub use microtask::{pending_microtasks, queue_microtask, run_microtasks, spawn_local};
