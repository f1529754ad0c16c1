//! Error types and the reporting seam.
//!
//! Every error the engine catches (user getter failures, user callback
//! failures, tick callback failures, runaway flushes) ends up in
//! [`handle_error`]. The host decides what reporting means by installing a
//! handler through [`crate::config::set_error_handler`]; without one the
//! error is logged through `tracing`.
//!
//! Invalid mutations are not errors in the propagating sense. They are turned
//! into a [`warn`] and treated as a no-op.

use std::fmt::Display;

use thiserror::Error;

use crate::config;
use crate::reactive::{untracked, Value};

/// Errors produced or carried by the reactive engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    #[error("Failed watching path \"{path}\": only simple dot-delimited paths are accepted")]
    InvalidPath {
        path: String,
    },

    #[error("Cannot {action} reactive property on a primitive value: {value}")]
    InvalidTarget {
        action: &'static str,
        value: String,
    },

    #[error("Cannot {action} key \"{key}\" on a sequence: not a valid index")]
    InvalidIndex {
        action: &'static str,
        key: String,
    },

    #[error("Avoid {action} properties on root data at runtime, declare them upfront")]
    ProtectedRoot {
        action: &'static str,
    },

    #[error("Cannot write key \"{key}\" on a frozen value")]
    Frozen {
        key: String,
    },

    #[error("Possible infinite update loop in watcher \"{expression}\": re-queued more than {limit} times in one flush")]
    CircularUpdate {
        expression: String,
        limit: u32,
    },

    #[error("{0}")]
    Message(String),
}

impl ReactiveError {
    /// Build a free-form error, typically returned from a getter or callback.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Route a caught error to the host.
///
/// `context` is the value the failing watcher was evaluated against, if any.
/// `info` describes where the error was caught (e.g. `callback for watcher "a.b"`).
///
/// The handler runs with dependency tracking suspended so that reading
/// reactive state while reporting cannot subscribe the failing watcher.
pub fn handle_error(err: &ReactiveError, context: Option<&Value>, info: &str) {
    match config::error_handler() {
        Some(handler) => untracked(|| handler(err, context, info)),
        None => tracing::error!(error = %err, info, "unhandled reactive error"),
    }
}

/// Emit a recoverable diagnostic.
///
/// Suppressed entirely when `config.silent` is set.
pub fn warn(message: impl Display) {
    if config::get().silent {
        return;
    }

    let message = message.to_string();
    match config::warn_handler() {
        Some(handler) => untracked(|| handler(&message)),
        None => tracing::warn!("{message}"),
    }
}
