//! Value model.
//!
//! Reactive state is a graph of [`Value`]s. Primitives are copied around by
//! value; [`Record`]s and [`Sequence`]s are shared handles with reference
//! identity, the same way objects and arrays behave in a dynamic language.
//! Whether a container is reactive is decided by whether an [`Observer`] is
//! attached to it, see [`crate::reactive::observe`].
//!
//! Record reads go through [`Record::get`], which is where dependency
//! tracking happens. Sequence elements have no per-index interception:
//! reading `seq.get(3)` is never tracked, and writing through
//! [`Sequence::assign`] never notifies. Structural changes go through the
//! intercepted mutators in `array.rs`.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::dep::Dep;
use super::observer::{self, Observer};
use super::watcher::Hook;

/// The shape of a value, decided once when it is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactiveKind {
    Primitive,
    Record,
    Sequence,
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Record(Record),
    Sequence(Sequence),
}

impl Value {
    pub fn kind(&self) -> ReactiveKind {
        match self {
            Value::Record(_) => ReactiveKind::Record,
            Value::Sequence(_) => ReactiveKind::Sequence,
            _ => ReactiveKind::Primitive,
        }
    }

    /// True for records and sequences.
    pub fn is_container(&self) -> bool {
        self.kind() != ReactiveKind::Primitive
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Identity comparison used by setters and watchers.
    ///
    /// Primitives compare by value with `NaN` equal to itself; containers
    /// compare by reference.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            (Value::Sequence(a), Value::Sequence(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The observer attached to this value, if it is an observed container.
    pub fn observer(&self) -> Option<Observer> {
        match self {
            Value::Record(record) => record.observer(),
            Value::Sequence(sequence) => sequence.observer(),
            _ => None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        match self {
            Value::Record(record) => record.is_frozen(),
            Value::Sequence(sequence) => sequence.is_frozen(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Value::Sequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    /// Build a fresh, unobserved value graph from JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::Sequence(Sequence::from(items.into_iter().map(Value::from_json).collect::<Vec<_>>()))
            }
            serde_json::Value::Object(map) => Value::Record(Record::from_pairs(
                map.into_iter().map(|(k, v)| (k, Value::from_json(v))),
            )),
        }
    }

    /// Snapshot the value as JSON without tracking any reads.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(*n, f),
            Value::String(s) => f.write_str(s),
            Value::Record(_) => f.write_str("[object Object]"),
            Value::Sequence(sequence) => {
                // A sequence nested inside itself joins as empty.
                let Some(_visit) = Visit::enter(sequence.addr()) else {
                    return Ok(());
                };
                let items = sequence.items();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_null() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        f.write_str("0")
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        write!(f, "{n:.0}")
    } else {
        write!(f, "{n}")
    }
}

thread_local! {
    /// Containers currently being formatted or serialized on this thread.
    static VISITING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Marks a container as in progress for a recursive walk. `enter` returns
/// `None` when the container is already being walked, i.e. it contains
/// itself.
struct Visit(usize);

impl Visit {
    fn enter(addr: usize) -> Option<Visit> {
        VISITING
            .with(|visiting| visiting.borrow_mut().insert(addr))
            .then_some(Visit(addr))
    }
}

impl Drop for Visit {
    fn drop(&mut self) {
        VISITING.with(|visiting| {
            visiting.borrow_mut().remove(&self.0);
        });
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Record(record) => record.fmt(f),
            Value::Sequence(sequence) => sequence.fmt(f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Record(record) => {
                let Some(_visit) = Visit::enter(record.addr()) else {
                    return serializer.serialize_unit();
                };
                let entries = record.entries_untracked();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in &entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Sequence(sequence) => {
                let Some(_visit) = Visit::enter(sequence.addr()) else {
                    return serializer.serialize_unit();
                };
                let items = sequence.to_vec();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<Sequence> for Value {
    fn from(sequence: Sequence) -> Self {
        Value::Sequence(sequence)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(Sequence::from(items))
    }
}

// ----------------------------------------------------------------------------
// Record
// ----------------------------------------------------------------------------

/// Interception state of a reactive property.
#[derive(Clone)]
pub(crate) struct ReactiveSlot {
    pub(crate) dep: Dep,
    pub(crate) shallow: bool,
    pub(crate) on_read: Option<Hook>,
    pub(crate) custom_setter: Option<Hook>,
}

/// One property of a record. Properties without a slot are inert.
#[derive(Clone)]
pub(crate) struct Property {
    pub(crate) value: Value,
    pub(crate) reactive: Option<ReactiveSlot>,
}

struct RecordInner {
    props: RefCell<IndexMap<String, Property>>,
    observer: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

/// A keyed container with reference identity.
///
/// Keys keep insertion order.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RecordInner>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RecordInner {
                props: RefCell::new(IndexMap::new()),
                observer: RefCell::new(None),
                frozen: Cell::new(false),
            }),
        }
    }

    /// Build an unobserved record from key/value pairs.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let record = Self::new();
        {
            let mut props = record.inner.props.borrow_mut();
            for (key, value) in pairs {
                props.insert(key.into(), Property { value, reactive: None });
            }
        }
        record
    }

    /// Read a property. Missing keys read as `Null`.
    ///
    /// If the property is reactive and a watcher is evaluating, the watcher
    /// subscribes to it.
    pub fn get(&self, key: &str) -> Value {
        observer::read_property(self, key)
    }

    /// Read a property without subscribing anyone.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.inner
            .props
            .borrow()
            .get(key)
            .map(|prop| prop.value.clone())
            .unwrap_or_default()
    }

    /// Plain assignment.
    ///
    /// Writing a reactive property notifies its readers. Writing a key that
    /// does not exist yet adds an inert property: use
    /// [`crate::reactive::set`] to add a reactive one.
    pub fn assign(&self, key: &str, value: impl Into<Value>) {
        observer::write_property(self, key, value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.props.borrow().is_empty()
    }

    /// Snapshot all entries without tracking.
    pub fn entries_untracked(&self) -> Vec<(String, Value)> {
        self.inner
            .props
            .borrow()
            .iter()
            .map(|(key, prop)| (key.clone(), prop.value.clone()))
            .collect()
    }

    /// Whether `key` is intercepted.
    pub fn is_reactive(&self, key: &str) -> bool {
        self.inner
            .props
            .borrow()
            .get(key)
            .is_some_and(|prop| prop.reactive.is_some())
    }

    /// The dep backing a reactive property.
    pub fn dep_for(&self, key: &str) -> Option<Dep> {
        self.inner
            .props
            .borrow()
            .get(key)
            .and_then(|prop| prop.reactive.as_ref().map(|slot| slot.dep.clone()))
    }

    /// Make the record non-extensible and read-only. Frozen records are never
    /// observed.
    pub fn freeze(&self) {
        self.inner.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    pub fn observer(&self) -> Option<Observer> {
        self.inner.observer.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Observer) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    pub(crate) fn props(&self) -> Ref<'_, IndexMap<String, Property>> {
        self.inner.props.borrow()
    }

    pub(crate) fn props_mut(&self) -> RefMut<'_, IndexMap<String, Property>> {
        self.inner.props.borrow_mut()
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_visit) = Visit::enter(self.addr()) else {
            return f.write_str("[Circular]");
        };
        let mut map = f.debug_map();
        for (key, value) in self.entries_untracked() {
            map.entry(&key, &value);
        }
        map.finish()
    }
}

// ----------------------------------------------------------------------------
// Sequence
// ----------------------------------------------------------------------------

struct SequenceInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

/// An ordered container with reference identity.
///
/// The structural mutators (`push`, `pop`, `shift`, `unshift`, `splice`,
/// `sort`, `reverse`) notify the sequence's observer; everything in this
/// block is unintercepted.
#[derive(Clone)]
pub struct Sequence {
    inner: Rc<SequenceInner>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Read an element. Never tracked.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Copy out the elements. Never tracked.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Index write. This cannot be intercepted and does not notify; use
    /// [`crate::reactive::set`] or `splice` for a reactive replacement.
    pub fn assign(&self, index: usize, value: impl Into<Value>) {
        if self.is_frozen() {
            crate::error::warn(crate::error::ReactiveError::Frozen { key: index.to_string() });
            return;
        }
        let mut items = self.inner.items.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        items[index] = value.into();
    }

    pub fn freeze(&self) {
        self.inner.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    pub fn observer(&self) -> Option<Observer> {
        self.inner.observer.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Sequence) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Observer) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    pub(crate) fn items(&self) -> Ref<'_, Vec<Value>> {
        self.inner.items.borrow()
    }

    /// Move the elements out so a mutation can run without holding a borrow.
    pub(crate) fn take_items(&self) -> Vec<Value> {
        std::mem::take(&mut *self.inner.items.borrow_mut())
    }

    pub(crate) fn put_items(&self, items: Vec<Value>) {
        *self.inner.items.borrow_mut() = items;
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for Sequence {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(SequenceInner {
                items: RefCell::new(items),
                observer: RefCell::new(None),
                frozen: Cell::new(false),
            }),
        }
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_visit) = Visit::enter(self.addr()) else {
            return f.write_str("[Circular]");
        };
        f.debug_list().entries(self.to_vec()).finish()
    }
}
