use std::borrow::Borrow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use tokio_util::sync::CancellationToken;

use crate::ChangeEvent;

/// Identifies a subscription on one [`ObservableStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber<K, V> {
    id: SubscriptionId,
    callback: Box<dyn Fn(&ChangeEvent<K, V>)>,
    token: Option<CancellationToken>,
    /// Cleared by [`ObservableStore::unsubscribe`], so that snapshots taken earlier skip it.
    active: Cell<bool>,
}

impl<K, V> Subscriber<K, V> {
    fn is_live(&self) -> bool {
        self.active.get()
            && !self
                .token
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }
}

struct StoreInner<K, V> {
    entries: RefCell<HashMap<K, V>>,
    subscribers: RefCell<Vec<Rc<Subscriber<K, V>>>>,
    next_subscription: Cell<u64>,
}

/// A key-value map that notifies subscribers of every mutation.
///
/// Cloning an `ObservableStore` creates a new handle to the **same** store.
///
/// # Invariants
///
/// 1. Every call to [`set`](Self::set), a successful [`delete`](Self::delete) and every
///    [`clear`](Self::clear) notify all live subscribers exactly once before returning.
/// 2. Events of consecutive mutations are delivered in call order.
/// 3. Subscribers registered during a notification pass do not receive the event of that pass.
/// 4. A subscriber whose token was cancelled, or that was unsubscribed, receives no further
///    events, including the remainder of a pass that is already in progress.
pub struct ObservableStore<K, V> {
    inner: Rc<StoreInner<K, V>>,
}

/// A non-owning handle to an [`ObservableStore`].
pub struct WeakStore<K, V> {
    inner: Weak<StoreInner<K, V>>,
}

impl<K, V> Clone for ObservableStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> Clone for WeakStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<K, V> WeakStore<K, V> {
    /// Returns the store, unless it has been dropped in the meantime.
    pub fn upgrade(&self) -> Option<ObservableStore<K, V>> {
        self.inner.upgrade().map(|inner| ObservableStore { inner })
    }
}

impl<K, V> Default for ObservableStore<K, V> {
    fn default() -> Self {
        Self {
            inner: Rc::new(StoreInner {
                entries: RefCell::new(HashMap::new()),
                subscribers: RefCell::new(Vec::new()),
                next_subscription: Cell::new(0),
            }),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ObservableStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self
            .inner
            .subscribers
            .try_borrow()
            .map(|s| s.len())
            .unwrap_or_default();
        let mut s = f.debug_struct("ObservableStore");
        match self.inner.entries.try_borrow() {
            Ok(entries) => s.field("entries", &*entries),
            Err(_) => s.field("entries", &"<borrowed>"),
        };
        s.field("subscribers", &subscribers).finish()
    }
}

impl<K, V> ObservableStore<K, V> {
    /// Creates an empty store without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a non-owning handle to this store.
    pub fn downgrade(&self) -> WeakStore<K, V> {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The number of entries in the store.
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Returns `true` if the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers `callback` for all future change events of this store.
    ///
    /// The subscription lasts until it is [unsubscribed](Self::unsubscribe) or the store is
    /// dropped.
    pub fn subscribe(&self, callback: impl Fn(&ChangeEvent<K, V>) + 'static) -> SubscriptionId {
        self.register(Box::new(callback), None)
    }

    /// Registers `callback` for all future change events until `token` is cancelled.
    ///
    /// A cancelled subscription is dropped, together with its callback, by the next
    /// registration, unsubscription or mutation of the store. Cancelling the token after the
    /// store has been dropped has no effect.
    pub fn subscribe_until(
        &self,
        callback: impl Fn(&ChangeEvent<K, V>) + 'static,
        token: CancellationToken,
    ) -> SubscriptionId {
        self.register(Box::new(callback), Some(token))
    }

    fn register(
        &self,
        callback: Box<dyn Fn(&ChangeEvent<K, V>)>,
        token: Option<CancellationToken>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.get());
        self.inner.next_subscription.set(id.0 + 1);

        let mut subscribers = self.inner.subscribers.borrow_mut();
        prune(&mut subscribers);

        if token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            tracing::trace!(?id, "Not registering subscriber with cancelled token");
            return id;
        }

        subscribers.push(Rc::new(Subscriber {
            id,
            callback,
            token,
            active: Cell::new(true),
        }));
        id
    }

    /// Removes the subscription `id`.
    ///
    /// Returns `false` if there was no such live subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let removed = match subscribers.iter().position(|s| s.id == id) {
            Some(idx) => {
                let subscriber = subscribers.swap_remove(idx);
                let was_live = subscriber.is_live();
                subscriber.active.set(false);
                was_live
            }
            None => false,
        };
        prune(&mut subscribers);
        removed
    }

    /// The number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        prune(&mut subscribers);
        subscribers.len()
    }

    fn notify(&self, event: &ChangeEvent<K, V>) {
        let snapshot = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            prune(&mut subscribers);
            subscribers.clone()
        };

        for subscriber in snapshot {
            // an earlier callback of this pass may have cancelled this one
            if subscriber.is_live() {
                (subscriber.callback)(event);
            }
        }
    }
}

fn prune<K, V>(subscribers: &mut Vec<Rc<Subscriber<K, V>>>) {
    let before = subscribers.len();
    subscribers.retain(|s| s.is_live());
    let pruned = before - subscribers.len();
    if pruned > 0 {
        tracing::trace!(pruned, "Removed cancelled subscribers");
    }
}

impl<K, V> ObservableStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Returns a clone of the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.entries.borrow().get(key).cloned()
    }

    /// Calls `f` with the value stored under `key`, without cloning it.
    ///
    /// The store is borrowed while `f` runs, so `f` must not mutate it.
    pub fn inspect<Q, R>(&self, key: &Q, f: impl FnOnce(&V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.entries.borrow().get(key).map(f)
    }

    /// Returns `true` if the store contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.entries.borrow().contains_key(key)
    }

    /// Returns all keys currently in the store, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// Inserts or overwrites the value for `key`.
    ///
    /// Emits [`ChangeEvent::Inserted`] if the key was absent, and [`ChangeEvent::Updated`]
    /// otherwise. Returns the replaced value.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        let previous = self
            .inner
            .entries
            .borrow_mut()
            .insert(key.clone(), value.clone());

        let event = match &previous {
            Some(previous) => ChangeEvent::Updated {
                key,
                value,
                previous: previous.clone(),
            },
            None => ChangeEvent::Inserted { key, value },
        };
        self.notify(&event);
        previous
    }

    /// Removes `key` from the store.
    ///
    /// Emits [`ChangeEvent::Removed`] and returns `true` if the key was present. Otherwise
    /// nothing is emitted.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let removed = self.inner.entries.borrow_mut().remove_entry(key);
        match removed {
            Some((key, previous)) => {
                self.notify(&ChangeEvent::Removed { key, previous });
                true
            }
            None => false,
        }
    }

    /// Removes all entries, emitting a single [`ChangeEvent::Cleared`].
    pub fn clear(&self) {
        let entries = std::mem::take(&mut *self.inner.entries.borrow_mut());
        drop(entries);
        self.notify(&ChangeEvent::Cleared);
    }
}
