//! Watcher Queue
//!
//! The queue collects watchers between notifications and the next flush.
//!
//! # Algorithm
//!
//! 1. [`queue_watcher`] adds a watcher once per flush (dedup by id) and
//!    schedules a flush on the next tick if none is scheduled yet.
//! 2. [`flush_scheduler_queue`] sorts the queue by id and walks it by index.
//!    The length is re-read every step because running a watcher can queue
//!    others; those are inserted at their sorted position among the entries
//!    not yet processed.
//! 3. A watcher that gets queued again by its own run is counted. Past
//!    `max_update_count` it is isolated for the rest of the flush: its
//!    pending copies are dropped, a diagnostic names it, and the flush goes
//!    on with the remaining watchers.
//! 4. After the loop the state is reset, then the activated hooks and the
//!    `after` hooks run.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::next_tick::next_tick;
use crate::config;
use crate::error::{handle_error, warn, ReactiveError, Result};
use crate::reactive::{Hook, Watcher, WatcherId};

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    activated: Vec<Hook>,
    /// Ids currently queued and not yet run.
    has: HashSet<WatcherId>,
    /// Re-queue counts for the flush in progress.
    circular: HashMap<WatcherId, u32>,
    /// Watchers refused for the rest of the flush.
    isolated: HashSet<WatcherId>,
    /// A flush is scheduled or running.
    waiting: bool,
    flushing: bool,
    index: usize,
    flush_timestamp: Option<Instant>,
}

impl SchedulerState {
    fn reset(&mut self) {
        self.index = 0;
        self.queue.clear();
        self.activated.clear();
        self.has.clear();
        self.circular.clear();
        self.isolated.clear();
        self.waiting = false;
        self.flushing = false;
    }
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

fn with_state<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
    SCHEDULER.with(|state| f(&mut state.borrow_mut()))
}

/// Queue a watcher for the next flush.
///
/// Queuing a watcher that is already queued does nothing. While a flush is
/// running the watcher is inserted in id order after the current position,
/// so it still runs in this flush. With `async_flush` off the flush happens
/// before this returns.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let schedule = with_state(|state| {
        if state.has.contains(&id) || state.isolated.contains(&id) {
            return false;
        }
        state.has.insert(id);

        if state.flushing {
            let mut position = state.queue.len();
            while position > state.index + 1 && state.queue[position - 1].id() > id {
                position -= 1;
            }
            state.queue.insert(position, watcher);
        } else {
            state.queue.push(watcher);
        }

        !std::mem::replace(&mut state.waiting, true)
    });

    if !schedule {
        return;
    }

    if config::get().async_flush {
        next_tick(flush_scheduler_queue);
    } else if let Err(err) = flush_scheduler_queue() {
        handle_error(&err, None, "scheduler flush");
    }
}

/// Collect a hook to run once the current flush has finished and been
/// reset, before the `after` hooks. Outside a flush the hook waits for the
/// next one.
pub fn queue_activated(hook: impl Fn() + 'static) {
    with_state(|state| state.activated.push(std::rc::Rc::new(hook)));
}

/// Run every queued watcher.
///
/// A non-user watcher error aborts the flush: the remaining watchers are
/// dropped, the scheduler is reset and the error is returned. No `after`
/// hooks run in that case.
pub fn flush_scheduler_queue() -> Result<()> {
    let limit = config::get().max_update_count;
    let queued = with_state(|state| {
        state.flushing = true;
        state.flush_timestamp = Some(Instant::now());
        state.queue.sort_by_key(Watcher::id);
        state.queue.len()
    });
    tracing::debug!(queued, "flushing watcher queue");

    loop {
        let Some(watcher) = with_state(|state| state.queue.get(state.index).cloned()) else {
            break;
        };
        let id = watcher.id();

        if let Some(before) = watcher.before_hook() {
            before();
        }
        with_state(|state| state.has.remove(&id));

        if let Err(err) = watcher.run() {
            tracing::debug!(id = id.raw(), "flush aborted by watcher error");
            with_state(SchedulerState::reset);
            return Err(err);
        }

        let runaway = with_state(|state| {
            state.index += 1;
            if !state.has.contains(&id) {
                return false;
            }
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            if *count <= limit {
                return false;
            }

            let index = state.index;
            let mut position = 0;
            state.queue.retain(|queued| {
                position += 1;
                position <= index || queued.id() != id
            });
            state.has.remove(&id);
            state.isolated.insert(id);
            true
        });

        if runaway {
            warn(ReactiveError::CircularUpdate {
                expression: watcher.expression().to_string(),
                limit,
            });
        }
    }

    let (ran, activated) = with_state(|state| {
        let ran = std::mem::take(&mut state.queue);
        let activated = std::mem::take(&mut state.activated);
        state.reset();
        (ran, activated)
    });
    tracing::debug!(ran = ran.len(), "watcher queue flushed");

    for hook in activated {
        hook();
    }

    let mut called = HashSet::new();
    for watcher in &ran {
        if !watcher.is_active() || !called.insert(watcher.id()) {
            continue;
        }
        if let Some(after) = watcher.after_hook() {
            after();
        }
    }
    Ok(())
}

/// When the most recent flush started.
pub fn current_flush_timestamp() -> Option<Instant> {
    with_state(|state| state.flush_timestamp)
}

pub fn is_flushing() -> bool {
    with_state(|state| state.flushing)
}

/// Number of queued watchers, including those already run in a flush in
/// progress.
pub fn pending_count() -> usize {
    with_state(|state| state.queue.len())
}
