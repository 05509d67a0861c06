use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture};
use rescache_store::{CancellationToken, ChangeEvent, ObservableStore, SubscriptionId};

use super::{PendingHandle, Resolution, ResolutionState, ResourceDefinition, accepts_completion};
use crate::config::StaleCompletionPolicy;
use crate::utils::defer::{DeferGuard, defer};

/// The store backing a [`ResourceCache`].
pub type CacheStore<T, E> = ObservableStore<String, ResolutionState<T, E>>;

/// A change of a [`ResourceCache`], as seen by its subscribers.
pub type CacheEvent<T, E> = ChangeEvent<String, ResolutionState<T, E>>;

/// Removes a key from its cache when dropped, see [`ResourceCache::watch_with_cleanup`].
pub type CleanupGuard = DeferGuard<Box<dyn FnOnce()>>;

/// The state shared by all observable caches of one name.
pub(crate) struct Namespace<T, E> {
    store: CacheStore<T, E>,
    generations: Cell<u64>,
}

impl<T, E> Default for Namespace<T, E> {
    fn default() -> Self {
        Self {
            store: ObservableStore::new(),
            generations: Cell::new(0),
        }
    }
}

impl<T, E> Namespace<T, E> {
    fn next_generation(&self) -> u64 {
        let generation = self.generations.get();
        self.generations.set(generation + 1);
        generation
    }
}

/// An observable cache of asynchronous resolutions.
///
/// Obtain one from [`ResourceRegistry::resource`](super::ResourceRegistry::resource). Cloning a
/// `ResourceCache` creates a new handle to the **same** cache.
///
/// Resolutions are spawned with [`tokio::task::spawn_local`], so the cache must be used from
/// within a [`LocalSet`](tokio::task::LocalSet).
///
/// # Invariants
///
/// 1. A key has at most one pending resolution. [`get`](Self::get) starts a resolution only if
///    the key is absent.
/// 2. Every state transition is a `set` on the underlying [`CacheStore`] and therefore
///    notifies subscribers synchronously, in the order the transitions happen.
/// 3. A resolution only writes its outcome if its pending entry is still current, unless the
///    cache is configured with [`StaleCompletionPolicy::Overwrite`].
pub struct ResourceCache<D: ResourceDefinition> {
    definition: Rc<D>,
    namespace: Rc<Namespace<D::Output, D::Error>>,
    policy: StaleCompletionPolicy,
}

impl<D: ResourceDefinition> Clone for ResourceCache<D> {
    fn clone(&self) -> Self {
        Self {
            definition: Rc::clone(&self.definition),
            namespace: Rc::clone(&self.namespace),
            policy: self.policy,
        }
    }
}

impl<D: ResourceDefinition> fmt::Debug for ResourceCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("name", &self.name())
            .field("entries", &self.namespace.store.len())
            .field("subscribers", &self.namespace.store.subscriber_count())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<D: ResourceDefinition> ResourceCache<D> {
    pub(crate) fn new(
        definition: D,
        namespace: Rc<Namespace<D::Output, D::Error>>,
        policy: StaleCompletionPolicy,
    ) -> Self {
        Self {
            definition: Rc::new(definition),
            namespace,
            policy,
        }
    }

    /// The namespace of this cache.
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The store holding the state of every key.
    ///
    /// Mutating the store directly bypasses the generation bookkeeping of the cache; prefer
    /// [`set_resolved`](Self::set_resolved) and [`remove`](Self::remove).
    pub fn store(&self) -> &CacheStore<D::Output, D::Error> {
        &self.namespace.store
    }

    /// Returns the state of `key` without starting a resolution.
    pub fn peek(&self, key: &str) -> Option<ResolutionState<D::Output, D::Error>> {
        self.namespace.store.get(key)
    }

    /// Looks up `key`, starting a resolution if the key is absent.
    ///
    /// Returns [`Resolution::Pending`] while a resolution is in flight, including the one this
    /// call may have just started. Await the handle and call `get` again to observe the
    /// outcome.
    ///
    /// Within a tokio runtime, resolutions are spawned onto the current
    /// [`LocalSet`](tokio::task::LocalSet). Without a runtime, a resolution only progresses
    /// while its handle is awaited.
    ///
    /// # Panics
    ///
    /// Panics if a resolution needs to be started within a tokio runtime, but outside of a
    /// `LocalSet`.
    pub fn get(&self, key: &str) -> Resolution<D::Output, D::Error> {
        match self.namespace.store.get(key) {
            Some(state) => state.into(),
            None => Resolution::Pending(self.start_resolution(key)),
        }
    }

    fn start_resolution(&self, key: &str) -> PendingHandle {
        let generation = self.namespace.next_generation();
        tracing::debug!(namespace = self.name(), key, generation, "Starting resolution");

        let resolution = self.definition.resolve(key);
        let store = self.namespace.store.downgrade();
        let namespace = self.name().to_owned();
        let owned_key = key.to_owned();
        let policy = self.policy;

        let settle = async move {
            let outcome = resolution.await;
            let Some(store) = store.upgrade() else {
                return;
            };

            let current = store
                .inspect(owned_key.as_str(), ResolutionState::pending_generation)
                .flatten();
            if !accepts_completion(policy, &namespace, &owned_key, generation, current) {
                return;
            }

            tracing::trace!(
                namespace = namespace.as_str(),
                key = owned_key.as_str(),
                generation,
                ok = outcome.is_ok(),
                "Resolution settled"
            );
            store.set(owned_key, ResolutionState::from_outcome(outcome));
        }
        .boxed_local();

        let handle = PendingHandle::spawn(generation, settle);
        self.namespace
            .store
            .set(key.to_owned(), ResolutionState::Pending(handle.clone()));
        handle
    }

    /// Resolves `key`, waiting for a pending resolution to settle.
    ///
    /// The stored error of a failed resolution is returned as-is.
    pub async fn load(&self, key: &str) -> Result<D::Output, D::Error> {
        loop {
            let handle = match self.get(key) {
                Resolution::Ready(value) => return Ok(value),
                Resolution::Failed(error) => return Err(error),
                Resolution::Pending(handle) => handle,
            };
            // an override of the key settles it before the pending resolution does
            future::select(handle, self.next_change(key)).await;
        }
    }

    /// Returns a future that completes on the next change of `key`.
    fn next_change(&self, key: &str) -> LocalBoxFuture<'static, ()> {
        let token = CancellationToken::new();
        let (sender, receiver) = oneshot::channel();
        let sender = RefCell::new(Some(sender));
        self.subscribe_to_key(
            key,
            move |_| {
                if let Some(sender) = sender.borrow_mut().take() {
                    sender.send(()).ok();
                }
            },
            Some(token.clone()),
        );

        let guard = token.drop_guard();
        async move {
            receiver.await.ok();
            drop(guard);
        }
        .boxed_local()
    }

    /// Writes a terminal state for `key`, regardless of its current state.
    ///
    /// No resolution is started. An in-flight resolution for `key` keeps running, but its
    /// outcome is discarded unless the cache is configured with
    /// [`StaleCompletionPolicy::Overwrite`].
    pub fn set_resolved(&self, key: &str, outcome: Result<D::Output, D::Error>) {
        let pending = self
            .namespace
            .store
            .inspect(key, ResolutionState::pending_generation)
            .flatten();
        if let Some(generation) = pending {
            tracing::debug!(
                namespace = self.name(),
                key,
                generation,
                "Overriding pending resolution"
            );
        }
        self.namespace
            .store
            .set(key.to_owned(), ResolutionState::from_outcome(outcome));
    }

    /// Removes `key`, so that the next [`get`](Self::get) resolves it again.
    ///
    /// Returns `false` if the key was absent.
    pub fn remove(&self, key: &str) -> bool {
        self.namespace.store.delete(key)
    }

    /// Calls `callback` for every change of `key`, and whenever the whole cache is cleared.
    ///
    /// If `token` is given, the subscription ends once it is cancelled.
    pub fn subscribe_to_key(
        &self,
        key: &str,
        callback: impl Fn(&CacheEvent<D::Output, D::Error>) + 'static,
        token: Option<CancellationToken>,
    ) -> SubscriptionId {
        let key = key.to_owned();
        let filtered = move |event: &CacheEvent<D::Output, D::Error>| {
            if event.concerns(key.as_str()) {
                callback(event);
            }
        };
        match token {
            Some(token) => self.namespace.store.subscribe_until(filtered, token),
            None => self.namespace.store.subscribe(filtered),
        }
    }

    /// Looks up `key` and subscribes to its changes until `token` is cancelled.
    ///
    /// This is the entry point for consumers that re-evaluate whenever the key changes: the
    /// callback fires when a pending resolution settles, on overrides, removals and clears.
    /// The lookup happens before subscribing, so the callback does not observe a resolution
    /// started by this very call.
    pub fn watch(
        &self,
        key: &str,
        callback: impl Fn(&CacheEvent<D::Output, D::Error>) + 'static,
        token: CancellationToken,
    ) -> Resolution<D::Output, D::Error> {
        let resolution = self.get(key);
        self.subscribe_to_key(key, callback, Some(token));
        resolution
    }

    /// Like [`watch`](Self::watch), and removes `key` from the cache once the returned guard is
    /// dropped.
    ///
    /// Since the namespace is shared, the removal also forces other caches of the same name to
    /// resolve the key again.
    pub fn watch_with_cleanup(
        &self,
        key: &str,
        callback: impl Fn(&CacheEvent<D::Output, D::Error>) + 'static,
        token: CancellationToken,
    ) -> (Resolution<D::Output, D::Error>, CleanupGuard) {
        let resolution = self.watch(key, callback, token);

        let store = self.namespace.store.downgrade();
        let key = key.to_owned();
        let guard = defer(Box::new(move || {
            if let Some(store) = store.upgrade() {
                store.delete(key.as_str());
            }
        }) as Box<dyn FnOnce()>);

        (resolution, guard)
    }
}
