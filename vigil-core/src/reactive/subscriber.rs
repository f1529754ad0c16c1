//! Identity types for the reactive system.
//!
//! Both watchers and deps carry a monotonically increasing id. Watcher ids
//! double as the scheduler's ordering key: a watcher constructed earlier
//! always gets a smaller id, so producers sort ahead of the consumers that
//! read them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a watcher.
///
/// Ids are handed out in construction order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate the next watcher id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    /// Generate the next dep id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DepId {
    fn default() -> Self {
        Self::new()
    }
}
