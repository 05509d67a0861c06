use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::future::FutureExt;

use super::{PendingHandle, Resolution, ResolutionState, ResourceDefinition, accepts_completion};
use crate::config::StaleCompletionPolicy;

/// The state shared by all static resources of one name.
pub(crate) struct StaticNamespace<T, E> {
    entries: RefCell<HashMap<String, ResolutionState<T, E>>>,
    generations: Cell<u64>,
}

impl<T, E> Default for StaticNamespace<T, E> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            generations: Cell::new(0),
        }
    }
}

/// A resource cache without change notification.
///
/// Lookups follow the same state machine as [`ResourceCache`](super::ResourceCache), but state
/// transitions are not published anywhere. Consumers learn about a settled resolution only by
/// awaiting its [`PendingHandle`] and looking the key up again.
pub struct StaticResource<D: ResourceDefinition> {
    definition: Rc<D>,
    namespace: Rc<StaticNamespace<D::Output, D::Error>>,
    policy: StaleCompletionPolicy,
}

impl<D: ResourceDefinition> Clone for StaticResource<D> {
    fn clone(&self) -> Self {
        Self {
            definition: Rc::clone(&self.definition),
            namespace: Rc::clone(&self.namespace),
            policy: self.policy,
        }
    }
}

impl<D: ResourceDefinition> fmt::Debug for StaticResource<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticResource")
            .field("name", &self.name())
            .field("entries", &self.len())
            .finish()
    }
}

impl<D: ResourceDefinition> StaticResource<D> {
    pub(crate) fn new(
        definition: D,
        namespace: Rc<StaticNamespace<D::Output, D::Error>>,
        policy: StaleCompletionPolicy,
    ) -> Self {
        Self {
            definition: Rc::new(definition),
            namespace,
            policy,
        }
    }

    /// The namespace of this resource.
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The number of keys with a state.
    pub fn len(&self) -> usize {
        self.namespace.entries.borrow().len()
    }

    /// Returns `true` if no key has a state.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up `key`, starting a resolution if the key is absent.
    ///
    /// See [`ResourceCache::get`](super::ResourceCache::get).
    pub fn get(&self, key: &str) -> Resolution<D::Output, D::Error> {
        let state = self.namespace.entries.borrow().get(key).cloned();
        match state {
            Some(state) => state.into(),
            None => Resolution::Pending(self.start_resolution(key)),
        }
    }

    fn start_resolution(&self, key: &str) -> PendingHandle {
        let generation = self.namespace.generations.get();
        self.namespace.generations.set(generation + 1);
        tracing::debug!(namespace = self.name(), key, generation, "Starting resolution");

        let resolution = self.definition.resolve(key);
        let namespace = Rc::downgrade(&self.namespace);
        let name = self.name().to_owned();
        let owned_key = key.to_owned();
        let policy = self.policy;

        let settle = async move {
            let outcome = resolution.await;
            let Some(namespace) = namespace.upgrade() else {
                return;
            };

            let mut entries = namespace.entries.borrow_mut();
            let current = entries
                .get(&owned_key)
                .and_then(ResolutionState::pending_generation);
            if accepts_completion(policy, &name, &owned_key, generation, current) {
                entries.insert(owned_key, ResolutionState::from_outcome(outcome));
            }
        }
        .boxed_local();

        let handle = PendingHandle::spawn(generation, settle);
        self.namespace
            .entries
            .borrow_mut()
            .insert(key.to_owned(), ResolutionState::Pending(handle.clone()));
        handle
    }

    /// Resolves `key`, waiting for a pending resolution to settle.
    pub async fn load(&self, key: &str) -> Result<D::Output, D::Error> {
        loop {
            match self.get(key) {
                Resolution::Ready(value) => return Ok(value),
                Resolution::Failed(error) => return Err(error),
                Resolution::Pending(handle) => handle.await,
            }
        }
    }

    /// Removes `key`, so that the next [`get`](Self::get) resolves it again.
    pub fn remove(&self, key: &str) -> bool {
        self.namespace.entries.borrow_mut().remove(key).is_some()
    }
}
