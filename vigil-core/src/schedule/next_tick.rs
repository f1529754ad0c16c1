//! Deferred callback queue.
//!
//! Callbacks passed to [`next_tick`] are collected in order and run together
//! by the next drain. Only one drain is pending at a time, so any number of
//! `next_tick` calls between two drains coalesce into one.
//!
//! A drain is scheduled with the first mechanism available:
//!
//! 1. [`DeferStrategy::LocalSet`]: wake the [`drive`] task.
//! 2. A current-thread tokio runtime: spawn a drain task onto it.
//! 3. Otherwise the drain waits for the host's checkpoint
//!    ([`run_microtasks`]) or for a [`Tick`] to be awaited.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{oneshot, Notify};

use crate::config::{self, DeferStrategy};
use crate::error::{handle_error, Result};

type TickCallback = Box<dyn FnOnce() -> Result<()>>;

#[derive(Default)]
struct TickState {
    callbacks: Vec<TickCallback>,
    pending: bool,
}

thread_local! {
    static TICKS: RefCell<TickState> = RefCell::new(TickState::default());
    static DRIVER: Rc<Notify> = Rc::new(Notify::new());
}

/// Defer `callback` to the next drain.
///
/// An error returned by the callback is reported through
/// [`handle_error`] with info `"nextTick"`; the remaining callbacks still
/// run.
pub fn next_tick<F>(callback: F)
where
    F: FnOnce() -> Result<()> + 'static,
{
    let schedule = TICKS.with(|ticks| {
        let mut ticks = ticks.borrow_mut();
        ticks.callbacks.push(Box::new(callback));
        !std::mem::replace(&mut ticks.pending, true)
    });

    if schedule {
        schedule_drain();
    }
}

fn schedule_drain() {
    if config::get().defer == DeferStrategy::LocalSet {
        tracing::trace!("tick drain scheduled on driver");
        DRIVER.with(|driver| driver.notify_one());
        return;
    }

    // Only a current-thread runtime is guaranteed to poll the task on this
    // thread, where the tick state lives.
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            tracing::trace!("tick drain spawned");
            handle.spawn(async {
                run_microtasks();
            });
        }
        _ => tracing::trace!("tick drain left to host checkpoint"),
    }
}

/// Future resolved by the next drain.
///
/// Polling a `Tick` whose drain has not happened yet runs the drain, so
/// awaiting it never depends on another task pumping the queue.
///
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use vigil_core::schedule::{pending_tick_count, tick};
///
/// tick().await;
/// assert_eq!(pending_tick_count(), 0);
/// # }
/// ```
pub fn tick() -> Tick {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
        Ok(())
    });
    Tick { rx }
}

/// Returned by [`tick`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct Tick {
    rx: oneshot::Receiver<()>,
}

impl Future for Tick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A closed channel means the tick state was torn down with the
        // thread; resolve rather than hang.
        if Pin::new(&mut self.rx).poll(cx).is_ready() {
            return Poll::Ready(());
        }
        run_microtasks();
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

/// Run one drain: every callback queued before it started.
///
/// Callbacks queued while draining belong to the next drain. Returns how
/// many callbacks ran.
fn flush_callbacks() -> usize {
    let callbacks = TICKS.with(|ticks| {
        let mut ticks = ticks.borrow_mut();
        ticks.pending = false;
        std::mem::take(&mut ticks.callbacks)
    });

    let count = callbacks.len();
    for callback in callbacks {
        if let Err(err) = callback() {
            handle_error(&err, None, "nextTick");
        }
    }
    count
}

/// Drain until nothing is pending, including drains scheduled by the
/// callbacks themselves. Returns the total number of callbacks run.
pub fn run_microtasks() -> usize {
    let mut total = 0;
    while TICKS.with(|ticks| ticks.borrow().pending) {
        total += flush_callbacks();
    }
    total
}

/// Number of callbacks waiting for the next drain.
pub fn pending_tick_count() -> usize {
    TICKS.with(|ticks| ticks.borrow().callbacks.len())
}

/// Drain ticks whenever one is scheduled, forever.
///
/// Used with [`DeferStrategy::LocalSet`]: spawn it with
/// `tokio::task::spawn_local` on the thread that owns the reactive state.
pub async fn drive() {
    let driver = DRIVER.with(Rc::clone);
    loop {
        driver.notified().await;
        let ran = run_microtasks();
        tracing::trace!(callbacks = ran, "tick drained");
    }
}
