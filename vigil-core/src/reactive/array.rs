//! Intercepted sequence mutators.
//!
//! Index writes on a sequence cannot be observed, so the sequence instead
//! routes its seven structural operations through [`intercept`]: run the
//! plain `Vec` operation, observe whatever was inserted, then notify the
//! container dep. An unobserved sequence runs the same operations with no
//! notification.

use std::cmp::Ordering;
use std::fmt;

use super::observer::observe_items;
use super::value::{Sequence, Value};
use crate::error::{warn, ReactiveError};

/// The intercepted operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayMethod {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Sort,
    Reverse,
}

impl ArrayMethod {
    pub const ALL: [ArrayMethod; 7] = [
        ArrayMethod::Push,
        ArrayMethod::Pop,
        ArrayMethod::Shift,
        ArrayMethod::Unshift,
        ArrayMethod::Splice,
        ArrayMethod::Sort,
        ArrayMethod::Reverse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ArrayMethod::Push => "push",
            ArrayMethod::Pop => "pop",
            ArrayMethod::Shift => "shift",
            ArrayMethod::Unshift => "unshift",
            ArrayMethod::Splice => "splice",
            ArrayMethod::Sort => "sort",
            ArrayMethod::Reverse => "reverse",
        }
    }

    /// Whether the operation can introduce new elements.
    pub fn inserts(&self) -> bool {
        matches!(self, ArrayMethod::Push | ArrayMethod::Unshift | ArrayMethod::Splice)
    }
}

impl fmt::Display for ArrayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run `op` against the elements, then observe `inserted` and notify.
///
/// The elements are moved out of the sequence while `op` runs, so a
/// comparator is free to read other reactive state.
fn intercept<R>(
    sequence: &Sequence,
    method: ArrayMethod,
    op: impl FnOnce(&mut Vec<Value>) -> (R, Vec<Value>),
) -> Option<R> {
    if sequence.is_frozen() {
        warn(ReactiveError::Frozen { key: method.name().to_string() });
        return None;
    }

    let mut items = sequence.take_items();
    let (result, inserted) = op(&mut items);
    sequence.put_items(items);

    if let Some(observer) = sequence.observer() {
        if method.inserts() {
            observe_items(&inserted);
        }
        tracing::trace!(method = method.name(), "sequence mutated");
        observer.dep().notify();
    }
    Some(result)
}

impl Sequence {
    /// Append values; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        self.extend(vec![value.into()])
    }

    /// Append several values in one notification; returns the new length.
    pub fn extend(&self, values: Vec<Value>) -> usize {
        intercept(self, ArrayMethod::Push, |items| {
            items.extend(values.iter().cloned());
            (items.len(), values)
        })
        .unwrap_or_else(|| self.len())
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        intercept(self, ArrayMethod::Pop, |items| (items.pop(), Vec::new())).flatten()
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        intercept(self, ArrayMethod::Shift, |items| {
            let first = if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            };
            (first, Vec::new())
        })
        .flatten()
    }

    /// Prepend values, keeping their order; returns the new length.
    pub fn unshift(&self, values: Vec<Value>) -> usize {
        intercept(self, ArrayMethod::Unshift, |items| {
            items.splice(0..0, values.iter().cloned());
            (items.len(), values)
        })
        .unwrap_or_else(|| self.len())
    }

    /// Remove `delete_count` elements at `start` and insert `values` there.
    ///
    /// `start` and `delete_count` are clamped to the sequence bounds. Returns
    /// the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, values: Vec<Value>) -> Vec<Value> {
        intercept(self, ArrayMethod::Splice, |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            let removed: Vec<Value> = items.splice(start..end, values.iter().cloned()).collect();
            (removed, values)
        })
        .unwrap_or_default()
    }

    /// Sort by string representation, the default ordering of a dynamic
    /// language's array sort. Nulls sort last.
    pub fn sort(&self) {
        self.sort_by(|a, b| match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.to_string().cmp(&b.to_string()),
        });
    }

    /// Stable sort with a comparator.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        intercept(self, ArrayMethod::Sort, |items| {
            items.sort_by(compare);
            ((), Vec::new())
        });
    }

    pub fn reverse(&self) {
        intercept(self, ArrayMethod::Reverse, |items| {
            items.reverse();
            ((), Vec::new())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{observe, Watcher, WatcherOptions};
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn numbers(sequence: &Sequence) -> Vec<f64> {
        sequence.to_vec().iter().filter_map(Value::as_f64).collect()
    }

    /// Observed `{"items": [3, 1, 2]}` with a sync watcher on `items`.
    /// Returns the sequence, the callback count and the watcher.
    fn watched_items() -> (Sequence, Rc<Cell<usize>>, Watcher) {
        let data = Value::from_json(json!({"items": [3, 1, 2]}));
        observe(&data, true);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let watcher = Watcher::new(
            &data,
            "items",
            move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            },
            WatcherOptions::default().sync(),
        )
        .unwrap();
        let items = data.as_record().unwrap().get_untracked("items");
        (items.as_sequence().unwrap().clone(), calls, watcher)
    }

    #[test]
    fn push_notifies_watcher() {
        let (items, calls, _watcher) = watched_items();
        items.push(4);
        assert_eq!(calls.get(), 1);
        assert_eq!(numbers(&items), vec![3.0, 1.0, 2.0, 4.0]);
    }

    #[test]
    fn pop_notifies_watcher() {
        let (items, calls, _watcher) = watched_items();
        assert_eq!(items.pop(), Some(Value::from(2)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn shift_notifies_watcher() {
        let (items, calls, _watcher) = watched_items();
        assert_eq!(items.shift(), Some(Value::from(3)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unshift_notifies_watcher() {
        let (items, calls, _watcher) = watched_items();
        assert_eq!(items.unshift(vec![Value::from(0)]), 4);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn splice_notifies_watcher() {
        let (items, calls, _watcher) = watched_items();
        let removed = items.splice(1, 1, vec![Value::from(10), Value::from(11)]);
        assert_eq!(removed, vec![Value::from(1)]);
        assert_eq!(calls.get(), 1);
        assert_eq!(numbers(&items), vec![3.0, 10.0, 11.0, 2.0]);
    }

    #[test]
    fn sort_notifies_watcher() {
        let (items, calls, _watcher) = watched_items();
        items.sort();
        assert_eq!(calls.get(), 1);
        assert_eq!(numbers(&items), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn reverse_notifies_watcher() {
        let (items, calls, _watcher) = watched_items();
        items.reverse();
        assert_eq!(calls.get(), 1);
        assert_eq!(numbers(&items), vec![2.0, 1.0, 3.0]);
    }

    #[test]
    fn frozen_sequence_warns_without_notifying() {
        let (items, calls, _watcher) = watched_items();
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        crate::config::set_warn_handler(move |msg| sink.borrow_mut().push(msg.to_string()));

        items.freeze();
        items.push(4);
        items.reverse();
        crate::config::clear_warn_handler();

        assert_eq!(calls.get(), 0);
        assert_eq!(warnings.borrow().len(), 2);
        assert_eq!(numbers(&items), vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn plain_operations_behave_like_vec() {
        let sequence = Sequence::from(vec![Value::from(2), Value::from(3)]);

        assert_eq!(sequence.push(4), 3);
        assert_eq!(sequence.unshift(vec![Value::from(0), Value::from(1)]), 5);
        assert_eq!(numbers(&sequence), vec![0.0, 1.0, 2.0, 3.0, 4.0]);

        assert_eq!(sequence.pop(), Some(Value::from(4)));
        assert_eq!(sequence.shift(), Some(Value::from(0)));

        let removed = sequence.splice(1, 1, vec![Value::from(20), Value::from(21)]);
        assert_eq!(removed, vec![Value::from(2)]);
        assert_eq!(numbers(&sequence), vec![1.0, 20.0, 21.0, 3.0]);

        sequence.reverse();
        assert_eq!(numbers(&sequence), vec![3.0, 21.0, 20.0, 1.0]);
    }

    #[test]
    fn splice_clamps_bounds() {
        let sequence = Sequence::from(vec![Value::from(1)]);
        assert!(sequence.splice(5, 3, vec![Value::from(2)]).is_empty());
        assert_eq!(numbers(&sequence), vec![1.0, 2.0]);
    }

    #[test]
    fn empty_pop_and_shift_return_none() {
        let sequence = Sequence::new();
        assert_eq!(sequence.pop(), None);
        assert_eq!(sequence.shift(), None);
    }

    #[test]
    fn default_sort_is_lexicographic() {
        let sequence = Sequence::from(vec![Value::from(10), Value::Null, Value::from(9), Value::from(1)]);
        sequence.sort();
        assert_eq!(
            sequence.to_vec(),
            vec![Value::from(1), Value::from(10), Value::from(9), Value::Null]
        );
    }

    #[test]
    fn inserted_values_are_observed() {
        let value = Value::from_json(json!([]));
        observe(&value, false);
        let sequence = value.as_sequence().unwrap();

        let pushed = Value::from_json(json!({"a": 1}));
        sequence.push(pushed.clone());
        assert!(pushed.observer().is_some());

        let spliced = Value::from_json(json!({"b": 1}));
        sequence.splice(0, 0, vec![spliced.clone()]);
        assert!(spliced.observer().is_some());
    }

    #[test]
    fn unobserved_sequence_does_not_observe_inserts() {
        let sequence = Sequence::new();
        let pushed = Value::from_json(json!({"a": 1}));
        sequence.push(pushed.clone());
        assert!(pushed.observer().is_none());
    }

    #[test]
    fn method_table_names() {
        let names: Vec<_> = ArrayMethod::ALL.iter().map(ArrayMethod::name).collect();
        assert_eq!(names, ["push", "pop", "shift", "unshift", "splice", "sort", "reverse"]);
    }
}
