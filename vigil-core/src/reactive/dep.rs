//! Dependency subject.
//!
//! A [`Dep`] is the "who reads this" list for one piece of reactive state:
//! one per reactive property and one per observed container. Reading the
//! state calls [`Dep::depend`]; writing it calls [`Dep::notify`].
//!
//! A dep keeps its subscribers alive. A watcher stays subscribed, and keeps
//! reacting, until it stops reading the state or is torn down, whether or
//! not the caller still holds a handle to it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::watcher::Watcher;
use super::{DepId, WatcherId};

struct DepInner {
    id: DepId,
    subs: RefCell<IndexMap<WatcherId, Watcher>>,
}

/// A set of subscribed watchers plus a notify primitive.
///
/// Cloning a `Dep` produces another handle to the same subscriber list.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

impl Dep {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::new(),
                subs: RefCell::new(IndexMap::new()),
            }),
        }
    }

    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Subscribe a watcher. Subscribing twice is a no-op.
    pub fn add_sub(&self, watcher: &Watcher) {
        self.inner
            .subs
            .borrow_mut()
            .entry(watcher.id())
            .or_insert_with(|| watcher.clone());
    }

    /// Unsubscribe a watcher by id.
    pub fn remove_sub(&self, id: WatcherId) {
        self.inner.subs.borrow_mut().shift_remove(&id);
    }

    /// Subscribe the currently evaluating watcher, if there is one.
    ///
    /// The watcher decides whether this is a new subscription; reading the
    /// same state twice in one evaluation subscribes once.
    pub fn depend(&self) {
        if let Some(target) = ReactiveContext::current() {
            target.add_dep(self);
        }
    }

    /// Tell every subscriber that the state changed.
    ///
    /// Subscribers are snapshotted first, so watchers that subscribe or
    /// unsubscribe while reacting do not disturb this pass. They run in
    /// ascending id order.
    pub fn notify(&self) {
        let mut subs: Vec<Watcher> = self.inner.subs.borrow().values().cloned().collect();
        subs.sort_by_key(Watcher::id);

        tracing::trace!(dep = self.id().raw(), subscribers = subs.len(), "dep notify");
        for watcher in &subs {
            watcher.update();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.borrow().len()
    }

    /// Check whether a watcher is subscribed.
    pub fn has_sub(&self, id: WatcherId) -> bool {
        self.inner.subs.borrow().contains_key(&id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
