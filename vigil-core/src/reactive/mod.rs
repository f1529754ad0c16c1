//! Reactive Primitives
//!
//! This module implements the observation and tracking half of the system:
//! turning plain data into observed data, recording which watchers read
//! which state, and notifying them when that state is written.
//!
//! # Concepts
//!
//! ## Observed data
//!
//! [`observe`] walks a [`Value`] and attaches an [`Observer`] to every
//! record and sequence in it. Each record property becomes reactive: it owns
//! a [`Dep`], reads go through [`Record::get`] and writes through
//! [`Record::assign`]. Sequences are tracked as a whole through their
//! mutator methods.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a getter with itself as the active context, so
//! every reactive read subscribes it. When a dep it read notifies, the
//! watcher is queued (see [`crate::schedule`]), re-run synchronously, or
//! marked dirty, depending on its options.
//!
//! ## Computed values and user watchers
//!
//! [`Computed`] and [`watch`] are the two common ways to build watchers.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded. The active-watcher stack and the
//! observation toggle are thread-local, and values are `Rc` handles.

mod array;
mod computed;
mod context;
mod dep;
mod observer;
mod path;
mod subscriber;
mod traverse;
mod value;
mod watch;
mod watcher;

pub use array::ArrayMethod;
pub use computed::Computed;
pub use context::{untracked, ReactiveContext};
pub use dep::Dep;
pub use observer::{
    define_reactive, del, observe, set, should_observe, toggle_observing, DefineOptions, Key,
    Observer,
};
pub use path::{parse_path, PathGetter};
pub use subscriber::{DepId, WatcherId};
pub use traverse::traverse;
pub use value::{ReactiveKind, Record, Sequence, Value};
pub use watch::{watch, Unwatch, WatchOptions};
pub use watcher::{Callback, Computation, Getter, Hook, Watcher, WatcherOptions};
