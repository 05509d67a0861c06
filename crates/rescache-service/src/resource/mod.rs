//! Resource caches: deduplicated asynchronous resolutions per key.
//!
//! A [`ResourceDefinition`] names a cache namespace and knows how to resolve a key. The
//! [`ResourceRegistry`] hands out a [`ResourceCache`] (observable) or a [`StaticResource`]
//! (plain) per definition. Both share their state with every other definition of the same name.
//!
//! Each key moves through the following states:
//!
//! ```text
//! absent  --get--------------> Pending
//! Pending --resolve succeeds--> Resolved
//! Pending --resolve fails-----> Failed
//! any     --set_resolved------> Resolved | Failed
//! ```
//!
//! A key is only ever resolved once per transition out of "absent". Terminal states stay until
//! they are overridden or removed; failures are never retried automatically.

use futures::future::LocalBoxFuture;

use crate::config::StaleCompletionPolicy;

mod cache;
mod registry;
mod state;
mod static_resource;

pub use cache::*;
pub use registry::*;
pub use state::*;
pub use static_resource::*;

/// Describes how to resolve the keys of one cache namespace.
pub trait ResourceDefinition: 'static {
    /// The value a successful resolution produces.
    type Output: Clone + 'static;
    /// The error a failed resolution produces.
    type Error: Clone + 'static;

    /// The cache namespace.
    ///
    /// All definitions with the same name share their cached state.
    fn name(&self) -> &str;

    /// Starts resolving `key`.
    ///
    /// This is invoked at most once per key until the key is removed from the cache.
    fn resolve(&self, key: &str) -> LocalBoxFuture<'static, Result<Self::Output, Self::Error>>;
}

/// Decides whether the resolution of `generation` may write its outcome.
///
/// `current` is the generation of the pending resolution currently stored for the key, if any.
fn accepts_completion(
    policy: StaleCompletionPolicy,
    namespace: &str,
    key: &str,
    generation: u64,
    current: Option<u64>,
) -> bool {
    if current == Some(generation) {
        return true;
    }
    match policy {
        StaleCompletionPolicy::Discard => {
            tracing::debug!(namespace, key, generation, "Discarding stale resolution");
            false
        }
        StaleCompletionPolicy::Overwrite => {
            tracing::debug!(namespace, key, generation, "Overwriting with stale resolution");
            true
        }
    }
}
