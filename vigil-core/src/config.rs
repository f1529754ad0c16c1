//! Engine configuration.
//!
//! Configuration is thread-local like the rest of the engine state. The
//! serializable part lives in [`ReactiveConfig`]; the error and warning
//! handlers are closures and are installed separately.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;
use crate::reactive::Value;

/// Receives every error caught by the engine: `(error, context, info)`.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, Option<&Value>, &str)>;

/// Receives every warning emitted by the engine.
pub type WarnHandler = Rc<dyn Fn(&str)>;

/// How the tick queue defers its drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferStrategy {
    /// Inside a current-thread tokio runtime the drain is spawned onto it.
    /// Elsewhere the host drains pending ticks at its own checkpoint by
    /// calling [`crate::schedule::run_microtasks`]. Awaiting a
    /// [`crate::schedule::Tick`] drains in either case.
    #[default]
    Microtask,

    /// Scheduling a drain also wakes [`crate::schedule::drive`], which the
    /// host runs on a tokio `LocalSet` on the same thread.
    LocalSet,
}

/// Tunable engine behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    /// How many times one watcher may be re-queued within a single flush
    /// before it is treated as a runaway update loop.
    pub max_update_count: u32,

    /// Batch watcher runs into a deferred flush. When false every queued
    /// watcher flushes synchronously.
    pub async_flush: bool,

    /// Deferral mechanism for the tick queue.
    pub defer: DeferStrategy,

    /// Suppress warnings.
    pub silent: bool,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            max_update_count: 100,
            async_flush: true,
            defer: DeferStrategy::Microtask,
            silent: false,
        }
    }
}

impl ReactiveConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

thread_local! {
    static CONFIG: RefCell<ReactiveConfig> = RefCell::new(ReactiveConfig::default());
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
}

/// Snapshot of the current configuration.
pub fn get() -> ReactiveConfig {
    CONFIG.with(|config| config.borrow().clone())
}

/// Replace the configuration.
pub fn set(config: ReactiveConfig) {
    CONFIG.with(|slot| *slot.borrow_mut() = config);
}

/// Modify the configuration in place.
pub fn update(f: impl FnOnce(&mut ReactiveConfig)) {
    CONFIG.with(|config| f(&mut config.borrow_mut()));
}

/// Install the error handler used by [`crate::error::handle_error`].
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&ReactiveError, Option<&Value>, &str) + 'static,
{
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the error handler; errors go back to `tracing`.
pub fn clear_error_handler() {
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = None);
}

/// Install the warning handler used by [`crate::error::warn`].
pub fn set_warn_handler<F>(handler: F)
where
    F: Fn(&str) + 'static,
{
    WARN_HANDLER.with(|slot| *slot.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the warning handler; warnings go back to `tracing`.
pub fn clear_warn_handler() {
    WARN_HANDLER.with(|slot| *slot.borrow_mut() = None);
}

pub(crate) fn error_handler() -> Option<ErrorHandler> {
    ERROR_HANDLER.with(|slot| slot.borrow().clone())
}

pub(crate) fn warn_handler() -> Option<WarnHandler> {
    WARN_HANDLER.with(|slot| slot.borrow().clone())
}
