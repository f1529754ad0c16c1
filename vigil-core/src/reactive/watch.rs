//! User watchers over a path or getter.

use std::fmt;

use super::context::untracked;
use super::value::Value;
use super::watcher::{Computation, Watcher, WatcherOptions};
use crate::error::{handle_error, Result};

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Also fire for mutations nested inside the watched value.
    pub deep: bool,
    /// Fire once right away with `(value, Null)`.
    pub immediate: bool,
    /// Fire synchronously on every change instead of once per flush.
    pub sync: bool,
}

impl WatchOptions {
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }
}

/// Handle returned by [`watch`].
///
/// The watcher stays subscribed until [`Unwatch::unwatch`] is called, even
/// if the handle is dropped first.
#[must_use = "without the handle the watcher can never be stopped"]
pub struct Unwatch {
    watcher: Watcher,
}

impl Unwatch {
    pub fn unwatch(self) {
        self.watcher.teardown();
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl fmt::Debug for Unwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unwatch").field(&self.watcher).finish()
    }
}

/// Watch `expression` on `context` and call `callback(new, old)` when it
/// changes.
///
/// Errors from the getter and callback are reported through
/// [`crate::error::handle_error`] rather than returned.
pub fn watch<F>(
    context: &Value,
    expression: impl Into<Computation>,
    callback: F,
    options: WatchOptions,
) -> Result<Unwatch>
where
    F: Fn(&Value, &Value) -> Result<()> + 'static,
{
    let mut watcher_options = WatcherOptions::default().user();
    watcher_options.deep = options.deep;
    watcher_options.sync = options.sync;

    let watcher = Watcher::new(context, expression, callback, watcher_options)?;

    if options.immediate {
        if let Some(callback) = watcher.callback() {
            let value = watcher.value();
            if let Err(err) = untracked(|| callback(&value, &Value::Null)) {
                let info = format!("callback for immediate watcher \"{}\"", watcher.expression());
                handle_error(&err, Some(context), &info);
            }
        }
    }

    Ok(Unwatch { watcher })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::observe;
    use crate::schedule::run_microtasks;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn data() -> Value {
        let data = Value::from_json(json!({"a": {"b": 1}}));
        observe(&data, true);
        data
    }

    #[test]
    fn fires_once_per_flush_with_new_and_old() {
        let data = data();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let _handle = watch(
            &data,
            "a.b",
            move |new, old| {
                sink.borrow_mut().push((new.clone(), old.clone()));
                Ok(())
            },
            WatchOptions::default(),
        )
        .unwrap();

        let inner = data.as_record().unwrap().get_untracked("a");
        inner.as_record().unwrap().assign("b", 2);
        inner.as_record().unwrap().assign("b", 3);
        assert!(calls.borrow().is_empty());

        run_microtasks();
        assert_eq!(calls.borrow().as_slice(), [(Value::from(3), Value::from(1))]);
    }

    #[test]
    fn immediate_fires_with_null_old_value() {
        let data = data();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let _handle = watch(
            &data,
            "a.b",
            move |new, old| {
                sink.borrow_mut().push((new.clone(), old.clone()));
                Ok(())
            },
            WatchOptions::default().immediate(),
        )
        .unwrap();

        assert_eq!(calls.borrow().as_slice(), [(Value::from(1), Value::Null)]);
    }

    #[test]
    fn unwatch_stops_callbacks() {
        let data = data();
        let calls = Rc::new(RefCell::new(0));
        let sink = calls.clone();
        let handle = watch(
            &data,
            "a.b",
            move |_, _| {
                *sink.borrow_mut() += 1;
                Ok(())
            },
            WatchOptions::default().sync(),
        )
        .unwrap();

        let inner = data.as_record().unwrap().get_untracked("a");
        inner.as_record().unwrap().assign("b", 2);
        handle.unwatch();
        inner.as_record().unwrap().assign("b", 3);

        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn callback_errors_are_reported() {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let sink = reported.clone();
        crate::config::set_error_handler(move |_, _, info| sink.borrow_mut().push(info.to_string()));

        let data = data();
        let _handle = watch(
            &data,
            "a.b",
            |_, _| Err(ReactiveError::msg("boom")),
            WatchOptions::default().immediate().sync(),
        )
        .unwrap();
        let inner = data.as_record().unwrap().get_untracked("a");
        inner.as_record().unwrap().assign("b", 2);
        crate::config::clear_error_handler();

        assert_eq!(
            reported.borrow().as_slice(),
            [
                "callback for immediate watcher \"a.b\"",
                "callback for watcher \"a.b\"",
            ]
        );
    }
}
