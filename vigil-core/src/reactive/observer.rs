//! Reactive converter.
//!
//! [`observe`] attaches an [`Observer`] to a record or sequence. For a
//! record, every property present at that moment becomes intercepted: reads
//! go through [`read_property`] and subscribe the evaluating watcher, writes
//! go through [`write_property`] and notify. A sequence gets a container dep
//! that its structural mutators notify.
//!
//! Keys added to an observed record after the fact are inert. [`set`] and
//! [`del`] are the escape hatches for structural changes that readers must
//! hear about.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::dep::Dep;
use super::value::{Property, ReactiveSlot, Record, Sequence, Value};
use super::watcher::Hook;
use super::ReactiveContext;
use crate::error::{warn, ReactiveError};

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable observation of new values on this thread.
pub fn toggle_observing(value: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(value));
}

pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

struct ObserverInner {
    dep: Dep,
    root_count: Cell<u32>,
}

/// Per-container reactive metadata.
///
/// The container dep is notified on structural change: sequence mutators,
/// and keys added or removed through [`set`] / [`del`].
#[derive(Clone)]
pub struct Observer {
    inner: Rc<ObserverInner>,
}

impl Observer {
    fn new() -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                dep: Dep::new(),
                root_count: Cell::new(0),
            }),
        }
    }

    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// How many times this container was observed as root data.
    pub fn root_count(&self) -> u32 {
        self.inner.root_count.get()
    }

    /// Root containers refuse structural mutation through `set` / `del`.
    pub fn is_root(&self) -> bool {
        self.root_count() > 0
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", self.dep())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// Attach an observer to `value`, or return the one already attached.
///
/// Returns `None` for primitives, frozen containers, and whenever
/// observation is toggled off. `as_root` marks the container as root data.
pub fn observe(value: &Value, as_root: bool) -> Option<Observer> {
    let observer = match value {
        Value::Record(record) => match record.observer() {
            Some(existing) => Some(existing),
            None if should_observe() && !record.is_frozen() => {
                let observer = Observer::new();
                record.attach_observer(observer.clone());
                walk(record);
                Some(observer)
            }
            None => None,
        },
        Value::Sequence(sequence) => match sequence.observer() {
            Some(existing) => Some(existing),
            None if should_observe() && !sequence.is_frozen() => {
                let observer = Observer::new();
                sequence.attach_observer(observer.clone());
                observe_items(&sequence.to_vec());
                Some(observer)
            }
            None => None,
        },
        _ => None,
    };

    if as_root {
        if let Some(observer) = &observer {
            observer.inner.root_count.set(observer.root_count() + 1);
        }
    }
    observer
}

/// Convert every existing key of a record into a reactive property.
fn walk(record: &Record) {
    for key in record.keys() {
        define_reactive(record, &key, None, DefineOptions::default());
    }
}

/// Observe each value of a list.
pub(crate) fn observe_items(items: &[Value]) {
    for item in items {
        observe(item, false);
    }
}

/// Options for [`define_reactive`].
#[derive(Clone, Default)]
pub struct DefineOptions {
    /// Called on every read of the property.
    pub on_read: Option<Hook>,
    /// Called before a changed value is stored.
    pub custom_setter: Option<Hook>,
    /// Do not observe the property's value.
    pub shallow: bool,
}

impl DefineOptions {
    pub fn shallow(mut self) -> Self {
        self.shallow = true;
        self
    }

    pub fn on_read(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_read = Some(Rc::new(hook));
        self
    }

    pub fn custom_setter(mut self, hook: impl Fn() + 'static) -> Self {
        self.custom_setter = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for DefineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefineOptions")
            .field("on_read", &self.on_read.is_some())
            .field("custom_setter", &self.custom_setter.is_some())
            .field("shallow", &self.shallow)
            .finish()
    }
}

/// Make `key` a reactive property of `record`.
///
/// `initial` defaults to the property's current value. Redefining an
/// existing reactive property replaces its dep. Frozen records are left
/// untouched.
pub fn define_reactive(record: &Record, key: &str, initial: Option<Value>, options: DefineOptions) {
    if record.is_frozen() {
        return;
    }

    let value = initial.unwrap_or_else(|| record.get_untracked(key));
    if !options.shallow {
        observe(&value, false);
    }

    let slot = ReactiveSlot {
        dep: Dep::new(),
        shallow: options.shallow,
        on_read: options.on_read,
        custom_setter: options.custom_setter,
    };
    record.props_mut().insert(
        key.to_string(),
        Property {
            value,
            reactive: Some(slot),
        },
    );
}

/// Intercepted read of a record property.
pub(crate) fn read_property(record: &Record, key: &str) -> Value {
    let (value, slot) = match record.props().get(key) {
        Some(prop) => (prop.value.clone(), prop.reactive.clone()),
        None => return Value::Null,
    };

    let Some(slot) = slot else {
        return value;
    };

    if let Some(hook) = &slot.on_read {
        hook();
    }

    if ReactiveContext::is_active() {
        slot.dep.depend();
        if !slot.shallow {
            if let Some(child) = value.observer() {
                child.dep().depend();
                if let Value::Sequence(sequence) = &value {
                    depend_array(sequence);
                }
            }
        }
    }
    value
}

/// Element reads of a sequence cannot be intercepted, so a reader of the
/// sequence subscribes to every nested container up front.
fn depend_array(sequence: &Sequence) {
    for item in sequence.to_vec() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Sequence(nested) = &item {
            depend_array(nested);
        }
    }
}

/// Intercepted write of a record property.
pub(crate) fn write_property(record: &Record, key: &str, new_value: Value) {
    if record.is_frozen() {
        warn(ReactiveError::Frozen { key: key.to_string() });
        return;
    }

    let slot = {
        let mut props = record.props_mut();
        match props.get_mut(key) {
            Some(prop) => match &prop.reactive {
                Some(_) if prop.value.same(&new_value) => return,
                Some(slot) => slot.clone(),
                None => {
                    prop.value = new_value;
                    return;
                }
            },
            None => {
                props.insert(
                    key.to_string(),
                    Property {
                        value: new_value,
                        reactive: None,
                    },
                );
                return;
            }
        }
    };

    if let Some(hook) = &slot.custom_setter {
        hook();
    }

    if let Some(prop) = record.props_mut().get_mut(key) {
        prop.value = new_value.clone();
    }
    if !slot.shallow {
        observe(&new_value, false);
    }
    slot.dep.notify();
}

/// A key for [`set`] / [`del`]: a property name or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(name) => name.parse().ok(),
        }
    }

    fn into_name(self) -> String {
        match self {
            Key::Name(name) => name,
            Key::Index(index) => index.to_string(),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Set a property, adding it as a reactive property if it is new.
///
/// Returns the value that was set.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();

    match target {
        Value::Sequence(sequence) => {
            let Some(index) = key.as_index() else {
                warn(ReactiveError::InvalidIndex {
                    action: "set",
                    key: key.to_string(),
                });
                return value;
            };
            if sequence.is_frozen() {
                warn(ReactiveError::Frozen { key: key.to_string() });
                return value;
            }
            if index > sequence.len() {
                let mut items = sequence.take_items();
                items.resize(index, Value::Null);
                sequence.put_items(items);
            }
            sequence.splice(index, 1, vec![value.clone()]);
            value
        }
        Value::Record(record) => {
            let key = key.into_name();
            if record.contains_key(&key) {
                record.assign(&key, value.clone());
                return value;
            }

            let observer = record.observer();
            if observer.as_ref().is_some_and(Observer::is_root) {
                warn(ReactiveError::ProtectedRoot { action: "adding" });
                return value;
            }
            if record.is_frozen() {
                warn(ReactiveError::Frozen { key });
                return value;
            }
            let Some(observer) = observer else {
                record.assign(&key, value.clone());
                return value;
            };

            define_reactive(record, &key, Some(value.clone()), DefineOptions::default());
            observer.dep().notify();
            value
        }
        primitive => {
            warn(ReactiveError::InvalidTarget {
                action: "set",
                value: primitive.to_string(),
            });
            value
        }
    }
}

/// Delete a property, notifying readers of the container.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();

    match target {
        Value::Sequence(sequence) => {
            let Some(index) = key.as_index() else {
                warn(ReactiveError::InvalidIndex {
                    action: "delete",
                    key: key.to_string(),
                });
                return;
            };
            if sequence.is_frozen() {
                warn(ReactiveError::Frozen { key: key.to_string() });
                return;
            }
            sequence.splice(index, 1, Vec::new());
        }
        Value::Record(record) => {
            let observer = record.observer();
            if observer.as_ref().is_some_and(Observer::is_root) {
                warn(ReactiveError::ProtectedRoot { action: "deleting" });
                return;
            }
            let key = key.into_name();
            if !record.contains_key(&key) {
                return;
            }
            if record.is_frozen() {
                warn(ReactiveError::Frozen { key });
                return;
            }
            record.props_mut().shift_remove(&key);
            if let Some(observer) = observer {
                observer.dep().notify();
            }
        }
        primitive => warn(ReactiveError::InvalidTarget {
            action: "delete",
            value: primitive.to_string(),
        }),
    }
}
