use std::any::{Any, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use super::cache::Namespace;
use super::static_resource::StaticNamespace;
use super::{ResourceCache, ResourceDefinition, StaticResource};
use crate::config::CachingConfig;

/// An error returned when looking up a cache in a [`ResourceRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The namespace already exists with different output or error types.
    #[error("namespace `{name}` stores `{existing}`, not `{requested}`")]
    TypeMismatch {
        /// The namespace.
        name: String,
        /// The state type the namespace was created with.
        existing: &'static str,
        /// The state type that was requested.
        requested: &'static str,
    },
}

struct NamespaceEntry {
    type_name: &'static str,
    namespace: Rc<dyn Any>,
}

type NamespaceTable = RefCell<HashMap<String, NamespaceEntry>>;

/// Hands out caches that share their state by name.
///
/// The registry replaces process-wide shared state: construct one at startup and pass it to
/// everything that needs a cache. Namespaces are created on first use and live as long as the
/// registry. Observable caches and static resources have separate namespaces, so a
/// [`ResourceCache`] and a [`StaticResource`] with the same name do not share state.
#[derive(Default)]
pub struct ResourceRegistry {
    config: CachingConfig,
    caches: NamespaceTable,
    statics: NamespaceTable,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |table: &NamespaceTable| {
            let mut names: Vec<_> = table.borrow().keys().cloned().collect();
            names.sort();
            names
        };
        f.debug_struct("ResourceRegistry")
            .field("config", &self.config)
            .field("caches", &names(&self.caches))
            .field("statics", &names(&self.statics))
            .finish()
    }
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new(config: CachingConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// The configuration applied to every cache of this registry.
    pub fn config(&self) -> &CachingConfig {
        &self.config
    }

    /// Returns the observable cache for `definition`.
    ///
    /// The cache shares its state with every other cache obtained for a definition with the
    /// same [`name`](ResourceDefinition::name).
    pub fn resource<D: ResourceDefinition>(
        &self,
        definition: D,
    ) -> Result<ResourceCache<D>, RegistryError> {
        let namespace = lookup::<Namespace<D::Output, D::Error>>(&self.caches, definition.name())?;
        Ok(ResourceCache::new(
            definition,
            namespace,
            self.config.stale_completions,
        ))
    }

    /// Returns the non-observable cache for `definition`.
    ///
    /// See [`StaticResource`] for how it differs from [`resource`](Self::resource).
    pub fn static_resource<D: ResourceDefinition>(
        &self,
        definition: D,
    ) -> Result<StaticResource<D>, RegistryError> {
        let namespace =
            lookup::<StaticNamespace<D::Output, D::Error>>(&self.statics, definition.name())?;
        Ok(StaticResource::new(
            definition,
            namespace,
            self.config.stale_completions,
        ))
    }

    /// The names of all observable namespaces created so far.
    pub fn namespaces(&self) -> Vec<String> {
        self.caches.borrow().keys().cloned().collect()
    }
}

fn lookup<N: Any + Default>(table: &NamespaceTable, name: &str) -> Result<Rc<N>, RegistryError> {
    let mut table = table.borrow_mut();
    let entry = table.entry(name.to_owned()).or_insert_with(|| {
        tracing::debug!(namespace = name, "Creating cache namespace");
        NamespaceEntry {
            type_name: type_name::<N>(),
            namespace: Rc::new(N::default()),
        }
    });

    Rc::clone(&entry.namespace)
        .downcast::<N>()
        .map_err(|_| RegistryError::TypeMismatch {
            name: name.to_owned(),
            existing: entry.type_name,
            requested: type_name::<N>(),
        })
}
