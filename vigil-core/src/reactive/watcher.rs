//! Watcher Implementation
//!
//! A Watcher is a tracked computation: it evaluates a getter, remembers
//! every dep the getter read, and reacts when any of them notifies.
//!
//! # How Watchers Work
//!
//! 1. [`Watcher::get`] pushes the watcher onto the reactive context and runs
//!    the getter. Every reactive read subscribes the watcher into a fresh
//!    dependency buffer.
//!
//! 2. After the getter returns, the fresh buffer is diffed against the
//!    previous one. Deps that were not read this time are unsubscribed, so
//!    the dependency edges always match the last evaluation exactly.
//!
//! 3. When a dep notifies, [`Watcher::update`] decides what to do based on
//!    the watcher's flags:
//!    - `lazy`: mark dirty and wait to be read (computed values)
//!    - `sync`: re-run immediately
//!    - otherwise: hand the watcher to the scheduler
//!
//! 4. [`Watcher::run`] re-evaluates and invokes the callback with
//!    `(new, old)`.
//!
//! # Ownership
//!
//! Deps hold their subscribers strongly, so a watcher keeps reacting after
//! every handle to it is dropped. [`Watcher::teardown`] is the only way to
//! stop it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::dep::Dep;
use super::path::{parse_path, PathGetter};
use super::traverse::traverse;
use super::value::Value;
use super::{DepId, WatcherId};
use crate::error::{handle_error, warn, ReactiveError, Result};
use crate::schedule::queue_watcher;

/// A getter closure. Receives the watcher's context value.
pub type Getter = Rc<dyn Fn(&Value) -> Result<Value>>;

/// A watcher callback, invoked with `(new, old)`.
pub type Callback = Rc<dyn Fn(&Value, &Value) -> Result<()>>;

/// A side-effect hook without arguments.
pub type Hook = Rc<dyn Fn()>;

/// What a watcher evaluates.
#[derive(Clone)]
pub enum Computation {
    /// A dot-delimited path read from the context, e.g. `"user.name"`.
    PathExpr(String),
    /// An arbitrary getter.
    Closure(Getter),
}

impl Computation {
    pub fn path(path: impl Into<String>) -> Self {
        Computation::PathExpr(path.into())
    }

    pub fn closure<F>(getter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + 'static,
    {
        Computation::Closure(Rc::new(getter))
    }
}

impl From<&str> for Computation {
    fn from(path: &str) -> Self {
        Computation::path(path)
    }
}

impl From<String> for Computation {
    fn from(path: String) -> Self {
        Computation::PathExpr(path)
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Computation::PathExpr(path) => f.debug_tuple("PathExpr").field(path).finish(),
            Computation::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

/// The getter after construction-time resolution.
enum ResolvedGetter {
    Path(PathGetter),
    Closure(Getter),
    /// A path that failed to parse; always yields `Null`.
    Noop,
}

impl ResolvedGetter {
    fn call(&self, context: &Value) -> Result<Value> {
        match self {
            ResolvedGetter::Path(path) => Ok(path.resolve(context)),
            ResolvedGetter::Closure(getter) => getter(context),
            ResolvedGetter::Noop => Ok(Value::Null),
        }
    }
}

/// Behaviour flags and hooks for a watcher.
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Traverse the result so nested mutation is tracked.
    pub deep: bool,
    /// Errors from the getter and callback are reported, not propagated.
    pub user: bool,
    /// Pull-based: only mark dirty on change, evaluate when read.
    pub lazy: bool,
    /// Re-run synchronously on notify instead of queuing.
    pub sync: bool,
    /// Called by the scheduler right before the watcher runs.
    pub before: Option<Hook>,
    /// Called by the scheduler after a flush in which the watcher ran.
    pub after: Option<Hook>,
    /// Name used in diagnostics for closure getters.
    pub label: Option<String>,
}

impl WatcherOptions {
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn user(mut self) -> Self {
        self.user = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    pub fn before(mut self, hook: impl Fn() + 'static) -> Self {
        self.before = Some(Rc::new(hook));
        self
    }

    pub fn after(mut self, hook: impl Fn() + 'static) -> Self {
        self.after = Some(Rc::new(hook));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("label", &self.label)
            .finish()
    }
}

/// Mutable per-evaluation state.
struct WatcherState {
    value: Value,
    dirty: bool,
    active: bool,
    /// Deps read by the last completed evaluation.
    deps: IndexMap<DepId, Dep>,
    /// Deps read by the evaluation in progress.
    new_deps: IndexMap<DepId, Dep>,
}

struct WatcherInner {
    id: WatcherId,
    context: Value,
    expression: String,
    getter: ResolvedGetter,
    callback: Option<Callback>,
    options: WatcherOptions,
    state: RefCell<WatcherState>,
}

/// A tracked computation node.
///
/// Cloning a `Watcher` creates another handle to the same node.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher with a callback.
    ///
    /// Unless `options.lazy` is set the getter is evaluated immediately to
    /// collect the initial dependencies; a non-user getter error is returned.
    pub fn new<F>(
        context: &Value,
        getter: impl Into<Computation>,
        callback: F,
        options: WatcherOptions,
    ) -> Result<Self>
    where
        F: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        Self::construct(context, getter.into(), Some(Rc::new(callback)), options)
    }

    /// Create a watcher without a callback, e.g. a render computation whose
    /// getter performs the work itself.
    pub fn render(
        context: &Value,
        getter: impl Into<Computation>,
        options: WatcherOptions,
    ) -> Result<Self> {
        Self::construct(context, getter.into(), None, options)
    }

    pub(crate) fn construct(
        context: &Value,
        computation: Computation,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self> {
        let (expression, getter) = match computation {
            Computation::PathExpr(path) => {
                let getter = match parse_path(&path) {
                    Some(parsed) => ResolvedGetter::Path(parsed),
                    None => {
                        warn(ReactiveError::InvalidPath { path: path.clone() });
                        ResolvedGetter::Noop
                    }
                };
                (path, getter)
            }
            Computation::Closure(getter) => (
                options.label.clone().unwrap_or_else(|| "<closure>".to_string()),
                ResolvedGetter::Closure(getter),
            ),
        };

        let lazy = options.lazy;
        let inner = Rc::new(WatcherInner {
            id: WatcherId::new(),
            context: context.clone(),
            expression,
            getter,
            callback,
            options,
            state: RefCell::new(WatcherState {
                value: Value::Null,
                dirty: lazy,
                active: true,
                deps: IndexMap::new(),
                new_deps: IndexMap::new(),
            }),
        });
        let watcher = Self { inner };

        if !lazy {
            let value = match watcher.get() {
                Ok(value) => value,
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            };
            watcher.inner.state.borrow_mut().value = value;
        }
        tracing::trace!(id = watcher.id().raw(), expression = %watcher.expression(), "watcher created");
        Ok(watcher)
    }

    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    /// The path, or the label given for a closure getter.
    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    pub fn context(&self) -> &Value {
        &self.inner.context
    }

    pub fn options(&self) -> &WatcherOptions {
        &self.inner.options
    }

    /// The cached value from the last evaluation.
    pub fn value(&self) -> Value {
        self.inner.state.borrow().value.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.borrow().dirty
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.borrow().active
    }

    /// Ids of the deps read by the last evaluation, in read order.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.inner.state.borrow().deps.keys().copied().collect()
    }

    /// Evaluate the getter and re-collect dependencies.
    pub fn get(&self) -> Result<Value> {
        let result = {
            let _ctx = ReactiveContext::enter(Some(self.clone()));
            let mut result = self.inner.getter.call(&self.inner.context);

            if self.inner.options.user {
                if let Err(err) = &result {
                    let info = format!("getter for watcher \"{}\"", self.expression());
                    handle_error(err, Some(&self.inner.context), &info);
                    result = Ok(Value::Null);
                }
            }
            if self.inner.options.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.cleanup_deps();
        result
    }

    /// Record a dep read during the evaluation in progress.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        let subscribe = {
            let mut state = self.inner.state.borrow_mut();
            let id = dep.id();
            if state.new_deps.contains_key(&id) {
                false
            } else {
                state.new_deps.insert(id, dep.clone());
                !state.deps.contains_key(&id)
            }
        };
        if subscribe {
            dep.add_sub(self);
        }
    }

    /// Unsubscribe from deps the last evaluation did not read, then swap the
    /// buffers.
    fn cleanup_deps(&self) {
        let stale: Vec<Dep> = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let stale = state
                .deps
                .iter()
                .filter(|(id, _)| !state.new_deps.contains_key(*id))
                .map(|(_, dep)| dep.clone())
                .collect();
            std::mem::swap(&mut state.deps, &mut state.new_deps);
            state.new_deps.clear();
            stale
        };

        for dep in stale {
            dep.remove_sub(self.id());
        }
    }

    /// Subscriber interface, called when a dep notifies.
    pub fn update(&self) {
        if self.inner.options.lazy {
            self.inner.state.borrow_mut().dirty = true;
        } else if self.inner.options.sync {
            if let Err(err) = self.run() {
                let info = format!("sync watcher \"{}\"", self.expression());
                handle_error(&err, Some(&self.inner.context), &info);
            }
        } else {
            queue_watcher(self.clone());
        }
    }

    /// Scheduler job interface: re-evaluate and fire the callback.
    ///
    /// The callback fires when the value changed identity, and also whenever
    /// the value is a container or the watcher is deep, since a container
    /// may have been mutated in place.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }

        let value = self.get()?;
        let old_value = {
            let mut state = self.inner.state.borrow_mut();
            if !value.same(&state.value) || value.is_container() || self.inner.options.deep {
                Some(std::mem::replace(&mut state.value, value.clone()))
            } else {
                None
            }
        };

        match old_value {
            Some(old_value) => self.invoke_callback(&value, &old_value),
            None => Ok(()),
        }
    }

    fn invoke_callback(&self, value: &Value, old_value: &Value) -> Result<()> {
        let Some(callback) = &self.inner.callback else {
            return Ok(());
        };

        if self.inner.options.user {
            if let Err(err) = callback(value, old_value) {
                let info = format!("callback for watcher \"{}\"", self.expression());
                handle_error(&err, Some(&self.inner.context), &info);
            }
            Ok(())
        } else {
            callback(value, old_value)
        }
    }

    pub(crate) fn callback(&self) -> Option<Callback> {
        self.inner.callback.clone()
    }

    /// Evaluate a lazy watcher and clear its dirty flag.
    pub fn evaluate(&self) -> Result<()> {
        let value = self.get()?;
        let mut state = self.inner.state.borrow_mut();
        state.value = value;
        state.dirty = false;
        Ok(())
    }

    /// Make the currently evaluating watcher depend on everything this
    /// watcher depends on.
    pub fn depend(&self) {
        let deps: Vec<Dep> = self.inner.state.borrow().deps.values().cloned().collect();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dep. Idempotent.
    pub fn teardown(&self) {
        let deps: Vec<Dep> = {
            let mut state = self.inner.state.borrow_mut();
            if !state.active {
                return;
            }
            state.active = false;
            state.deps.values().cloned().collect()
        };

        for dep in deps {
            dep.remove_sub(self.id());
        }
        tracing::trace!(id = self.id().raw(), "watcher torn down");
    }

    pub(crate) fn before_hook(&self) -> Option<Hook> {
        self.inner.options.before.clone()
    }

    pub(crate) fn after_hook(&self) -> Option<Hook> {
        self.inner.options.after.clone()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("dirty", &state.dirty)
            .field("active", &state.active)
            .field("dependency_count", &state.deps.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe;
    use crate::schedule::run_microtasks;
    use serde_json::json;
    use std::cell::Cell;

    fn observed(json: serde_json::Value) -> Value {
        let value = Value::from_json(json);
        observe(&value, false);
        value
    }

    #[test]
    fn path_getter_reads_context() {
        let data = observed(json!({"a": {"b": 7}}));
        let watcher = Watcher::render(&data, "a.b", WatcherOptions::default()).unwrap();
        assert_eq!(watcher.value(), Value::from(7));
        assert_eq!(watcher.expression(), "a.b");
    }

    #[test]
    fn invalid_path_warns_and_yields_null() {
        let warnings = Rc::new(Cell::new(0));
        let sink = warnings.clone();
        crate::config::set_warn_handler(move |_| sink.set(sink.get() + 1));

        let data = observed(json!({"a": 1}));
        let watcher = Watcher::render(&data, "a[0]", WatcherOptions::default()).unwrap();
        crate::config::clear_warn_handler();

        assert_eq!(warnings.get(), 1);
        assert!(watcher.value().is_null());
        assert!(watcher.dep_ids().is_empty());
    }

    #[test]
    fn dependencies_follow_the_last_evaluation() {
        let data = observed(json!({"flag": true, "a": 1, "b": 2}));
        let record = data.as_record().unwrap().clone();
        let watcher = Watcher::render(
            &data,
            Computation::closure(|ctx| {
                let record = ctx.as_record().unwrap();
                Ok(if record.get("flag") == Value::from(true) {
                    record.get("a")
                } else {
                    record.get("b")
                })
            }),
            WatcherOptions::default().sync(),
        )
        .unwrap();

        let dep_a = record.dep_for("a").unwrap();
        let dep_b = record.dep_for("b").unwrap();
        assert!(dep_a.has_sub(watcher.id()));
        assert!(!dep_b.has_sub(watcher.id()));

        record.assign("flag", false);
        assert!(!dep_a.has_sub(watcher.id()));
        assert!(dep_b.has_sub(watcher.id()));
        assert_eq!(watcher.value(), Value::from(2));
    }

    #[test]
    fn non_user_getter_error_propagates() {
        let result = Watcher::render(
            &Value::Null,
            Computation::closure(|_| Err(ReactiveError::msg("render failed"))),
            WatcherOptions::default(),
        );
        assert_eq!(result.unwrap_err(), ReactiveError::msg("render failed"));
    }

    #[test]
    fn user_getter_error_is_reported() {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let sink = reported.clone();
        crate::config::set_error_handler(move |err, _, info| {
            sink.borrow_mut().push(format!("{info}: {err}"));
        });

        let watcher = Watcher::new(
            &Value::Null,
            Computation::closure(|_| Err(ReactiveError::msg("bad read"))),
            |_, _| Ok(()),
            WatcherOptions::default().user().label("broken"),
        )
        .unwrap();
        crate::config::clear_error_handler();

        assert!(watcher.value().is_null());
        assert_eq!(
            reported.borrow().as_slice(),
            ["getter for watcher \"broken\": bad read"]
        );
    }

    #[test]
    fn lazy_watcher_waits_for_evaluate() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let watcher = Watcher::render(
            &Value::Null,
            Computation::closure(move |_| {
                counter.set(counter.get() + 1);
                Ok(Value::from(1))
            }),
            WatcherOptions::default().lazy(),
        )
        .unwrap();

        assert_eq!(calls.get(), 0);
        assert!(watcher.is_dirty());

        watcher.evaluate().unwrap();
        assert_eq!(calls.get(), 1);
        assert!(!watcher.is_dirty());

        watcher.update();
        assert!(watcher.is_dirty());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn run_skips_callback_for_unchanged_primitive() {
        let data = observed(json!({"a": 1}));
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let watcher = Watcher::new(
            &data,
            "a",
            move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            },
            WatcherOptions::default(),
        )
        .unwrap();

        watcher.run().unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn run_refires_for_containers_and_deep() {
        let data = observed(json!({"obj": {"x": 1}, "n": 1}));
        let calls = Rc::new(Cell::new(0));

        let counter = calls.clone();
        let container = Watcher::new(
            &data,
            "obj",
            move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            },
            WatcherOptions::default(),
        )
        .unwrap();
        container.run().unwrap();
        assert_eq!(calls.get(), 1);

        let counter = calls.clone();
        let deep = Watcher::new(
            &data,
            "n",
            move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            },
            WatcherOptions::default().deep(),
        )
        .unwrap();
        deep.run().unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn deep_watcher_tracks_nested_writes() {
        let data = observed(json!({"obj": {"inner": {"x": 1}}}));
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let _watcher = Watcher::new(
            &data,
            "obj",
            move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            },
            WatcherOptions::default().deep(),
        )
        .unwrap();

        let inner = data
            .as_record()
            .unwrap()
            .get_untracked("obj")
            .as_record()
            .unwrap()
            .get_untracked("inner");
        inner.as_record().unwrap().assign("x", 2);
        run_microtasks();

        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn teardown_is_idempotent_and_stops_updates() {
        let data = observed(json!({"a": 1}));
        let record = data.as_record().unwrap().clone();
        let watcher = Watcher::render(&data, "a", WatcherOptions::default().sync()).unwrap();
        let dep = record.dep_for("a").unwrap();
        assert_eq!(dep.subscriber_count(), 1);

        watcher.teardown();
        watcher.teardown();
        assert!(!watcher.is_active());
        assert_eq!(dep.subscriber_count(), 0);

        record.assign("a", 2);
        assert_eq!(watcher.value(), Value::from(1));
    }

    #[test]
    fn dropped_handle_keeps_reacting_until_teardown() {
        let data = observed(json!({"a": 1}));
        let record = data.as_record().unwrap().clone();
        let calls = Rc::new(Cell::new(0));

        let counter = calls.clone();
        let id = Watcher::new(
            &data,
            "a",
            move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            },
            WatcherOptions::default().sync(),
        )
        .unwrap()
        .id();

        record.assign("a", 2);
        assert_eq!(calls.get(), 1);

        let dep = record.dep_for("a").unwrap();
        assert!(dep.has_sub(id));
    }

    #[test]
    fn failed_construction_leaves_no_subscription() {
        let data = observed(json!({"a": 1}));
        let dep = data.as_record().unwrap().dep_for("a").unwrap();
        let result = Watcher::render(
            &data,
            Computation::closure(|ctx| {
                ctx.as_record().unwrap().get("a");
                Err(ReactiveError::msg("render failed"))
            }),
            WatcherOptions::default(),
        );

        assert!(result.is_err());
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn depend_forwards_to_active_watcher() {
        let data = observed(json!({"a": 1}));
        let dep = data.as_record().unwrap().dep_for("a").unwrap();
        let lazy = Watcher::render(&data, "a", WatcherOptions::default().lazy()).unwrap();
        lazy.evaluate().unwrap();

        let lazy_for_outer = lazy.clone();
        let outer = Watcher::render(
            &Value::Null,
            Computation::closure(move |_| {
                lazy_for_outer.depend();
                Ok(lazy_for_outer.value())
            }),
            WatcherOptions::default(),
        )
        .unwrap();

        assert!(dep.has_sub(outer.id()));
        assert_eq!(outer.value(), Value::from(1));
    }
}
