//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (observed structures, effects, computed values,
//!   refs, watchers)
//! - Microtask scheduling and a deduplicating job queue
//! - Virtual DOM, keyed children diffing and the component host
//!
//! Everything runs on one thread. Deferred work waits in a microtask queue
//! until the embedder calls [`scheduler::run_microtasks`].
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Observed data and dependency tracking
//! - `scheduler`: Microtasks, a local task executor and the job queue
//! - `render`: Abstract trees, reconciliation and components
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use serde_json::json;
//! use trellis_core::reactive::{computed, effect, EffectOptions, Reactive};
//!
//! let state = Reactive::from_json(json!({ "count": 1 }));
//!
//! // A derived value
//! let reader = state.clone();
//! let doubled = computed(move || reader.get("count").as_f64() * 2.0);
//!
//! // An effect that re-runs when `count` changes
//! let seen = Rc::new(Cell::new(0.0));
//! let (reader, sink) = (state.clone(), seen.clone());
//! let _effect = effect(move || sink.set(reader.get("count").as_f64()), EffectOptions::default());
//!
//! state.set("count", 5);
//! assert_eq!(seen.get(), 5.0);
//! assert_eq!(doubled.get(), 10.0);
//! ```

pub mod error;
pub mod reactive;
pub mod render;
pub mod scheduler;

pub use error::{LoadError, ReactiveError};
