//! Keyed, asynchronous result caches with change notification.
//!
//! The central type is the [`ResourceCache`](resource::ResourceCache). It maps string keys to
//! the [`ResolutionState`](resource::ResolutionState) of an asynchronous resolution provided by
//! a [`ResourceDefinition`](resource::ResourceDefinition). Concurrent requests for the same key
//! share one in-flight resolution, and every state transition is published through the
//! [`ObservableStore`] backing the cache.
//!
//! Caches are handed out by a [`ResourceRegistry`](resource::ResourceRegistry), which shares one
//! store between all definitions with the same name.

pub mod config;
pub mod logging;
pub mod resource;
pub mod utils;

pub use rescache_store::{CancellationToken, ChangeEvent, ObservableStore, SubscriptionId};
