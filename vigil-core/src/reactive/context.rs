//! Reactive Context
//!
//! The reactive context tracks which watcher is currently evaluating, so a
//! dep that is read can subscribe it.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Entering a watcher's evaluation
//! pushes a frame holding that watcher; leaving pops it. A frame may also be
//! empty, which suspends tracking for everything evaluated inside it (used
//! for immediate watch callbacks and error handlers).
//!
//! The stack rather than a single slot is what makes nested evaluation safe:
//! a render watcher reading a computed value evaluates the computed watcher
//! in the middle of its own getter, and the render watcher must be the
//! active one again once that returns.

use std::cell::RefCell;

use super::watcher::Watcher;
use super::WatcherId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context frame when dropped.
///
/// Dropping restores the previous frame even if the evaluation inside
/// returned early with an error.
pub struct ReactiveContext {
    watcher_id: Option<WatcherId>,
}

impl ReactiveContext {
    /// Enter a new frame for the given watcher, or an untracked frame for
    /// `None`.
    pub fn enter(watcher: Option<Watcher>) -> Self {
        let watcher_id = watcher.as_ref().map(Watcher::id);
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(watcher));
        Self { watcher_id }
    }

    /// Check if a watcher is currently collecting dependencies.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the watcher currently collecting dependencies, if any.
    pub fn current() -> Option<Watcher> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Number of frames on the stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.as_ref().map(Watcher::id),
                self.watcher_id,
                "ReactiveContext mismatch"
            );
        }
    }
}

/// Run `f` with dependency tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(None);
    f()
}
