//! Computed Values
//!
//! A computed value is a lazy watcher with a caching getter in front of it.
//! A dep change only marks it dirty; the getter re-runs the next time the
//! value is read. Reading it inside another watcher's evaluation forwards
//! the computed value's dependencies to that watcher, so the reader is
//! notified by the same state changes that would invalidate the cache.

use super::context::ReactiveContext;
use super::value::Value;
use super::watcher::{Computation, Watcher, WatcherOptions};
use crate::error::Result;

/// A cached derived value.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use vigil_core::reactive::{observe, Computed, Computation, Value};
///
/// let data = Value::from_json(json!({"n": 2}));
/// observe(&data, true);
///
/// let doubled = Computed::new(
///     &data,
///     Computation::closure(|ctx| {
///         let n = ctx.as_record().and_then(|r| r.get("n").as_f64()).unwrap_or(0.0);
///         Ok(Value::from(n * 2.0))
///     }),
/// )
/// .unwrap();
///
/// assert_eq!(doubled.get().unwrap(), Value::from(4));
/// data.as_record().unwrap().assign("n", 5);
/// assert_eq!(doubled.get().unwrap(), Value::from(10));
/// ```
#[derive(Clone, Debug)]
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    pub fn new(context: &Value, getter: impl Into<Computation>) -> Result<Self> {
        Self::with_options(context, getter, WatcherOptions::default())
    }

    /// Build with extra options; `lazy` is always forced on.
    pub fn with_options(
        context: &Value,
        getter: impl Into<Computation>,
        options: WatcherOptions,
    ) -> Result<Self> {
        let watcher = Watcher::render(context, getter, options.lazy())?;
        Ok(Self { watcher })
    }

    /// Read the value, re-evaluating first if a dependency changed.
    pub fn get(&self) -> Result<Value> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }
        if ReactiveContext::is_active() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn sum_of(data: &Value, calls: Rc<Cell<u32>>) -> Computed {
        Computed::new(
            data,
            Computation::closure(move |ctx| {
                calls.set(calls.get() + 1);
                let record = ctx.as_record().unwrap();
                let a = record.get("a").as_f64().unwrap_or(0.0);
                let b = record.get("b").as_f64().unwrap_or(0.0);
                Ok(Value::from(a + b))
            }),
        )
        .unwrap()
    }

    #[test]
    fn caches_until_a_dependency_changes() {
        let data = Value::from_json(json!({"a": 1, "b": 2}));
        observe(&data, true);
        let calls = Rc::new(Cell::new(0));
        let sum = sum_of(&data, calls.clone());

        assert_eq!(calls.get(), 0);
        assert_eq!(sum.get().unwrap(), Value::from(3));
        assert_eq!(sum.get().unwrap(), Value::from(3));
        assert_eq!(calls.get(), 1);

        data.as_record().unwrap().assign("a", 10);
        assert!(sum.is_dirty());
        assert_eq!(calls.get(), 1);
        assert_eq!(sum.get().unwrap(), Value::from(12));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn readers_inherit_dependencies() {
        let data = Value::from_json(json!({"a": 1, "b": 2}));
        observe(&data, true);
        let sum = sum_of(&data, Rc::new(Cell::new(0)));

        let reader_sum = sum.clone();
        let seen = Rc::new(Cell::new(0.0));
        let sink = seen.clone();
        let _reader = Watcher::new(
            &Value::Null,
            Computation::closure(move |_| reader_sum.get()),
            move |value, _| {
                sink.set(value.as_f64().unwrap_or(f64::NAN));
                Ok(())
            },
            WatcherOptions::default().sync(),
        )
        .unwrap();

        data.as_record().unwrap().assign("b", 5);
        assert_eq!(seen.get(), 6.0);
    }
}
