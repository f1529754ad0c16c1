//! Update Scheduling
//!
//! Watchers that react asynchronously are not run when their deps notify.
//! They are queued, and one flush per tick runs every queued watcher in
//! ascending id order. Since ids follow creation order, a watcher always
//! runs before the watchers created after it, so producers settle before
//! the consumers reading their output.
//!
//! The tick itself is a FIFO of deferred callbacks (see [`next_tick`]),
//! drained either at the host's own checkpoint ([`run_microtasks`]) or by a
//! driver task on a tokio `LocalSet` ([`drive`]).

mod next_tick;
mod queue;

pub use next_tick::{drive, next_tick, pending_tick_count, run_microtasks, tick, Tick};
pub use queue::{
    current_flush_timestamp, flush_scheduler_queue, is_flushing, pending_count, queue_activated,
    queue_watcher,
};
