//! Vigil Core
//!
//! This crate provides the dependency tracking and update scheduling core
//! of a reactive data engine. It implements:
//!
//! - Observed data: records and sequences whose reads and writes are tracked
//! - Watchers: computations that subscribe to what they read
//! - Computed values and user watchers built on top of watchers
//! - A batching scheduler that flushes queued watchers once per tick
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: values, observers, deps, watchers and the active-watcher stack
//! - `schedule`: the watcher queue and the deferred tick queue
//! - `error`: the error type and the single reporting seam
//! - `config`: thread-local engine configuration and host handlers
//!
//! All engine state is thread-local. Values are `Rc` handles and must stay
//! on the thread that created them.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use serde_json::json;
//! use vigil_core::reactive::{observe, watch, Value, WatchOptions};
//! use vigil_core::schedule::run_microtasks;
//!
//! let data = Value::from_json(json!({"count": 1}));
//! observe(&data, true);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let _handle = watch(
//!     &data,
//!     "count",
//!     move |new, old| {
//!         sink.borrow_mut().push((new.clone(), old.clone()));
//!         Ok(())
//!     },
//!     WatchOptions::default(),
//! )
//! .unwrap();
//!
//! let record = data.as_record().unwrap();
//! record.assign("count", 2);
//! record.assign("count", 3);
//!
//! // Both writes land in one flush.
//! run_microtasks();
//! assert_eq!(seen.borrow().as_slice(), [(Value::from(3), Value::from(1))]);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod schedule;

pub use error::{ReactiveError, Result};
