use std::collections::HashMap;

use anyhow::{Context, Result};
use futures::future;
use rescache_service::resource::ResourceRegistry;

use crate::output::Outcome;
use crate::resource::DirectoryResource;
use crate::settings::Settings;

/// Resolves all requested keys concurrently through one registry.
///
/// Requests for the same key share a single read. Outcomes are returned in request order.
pub async fn resolve_all(settings: &Settings) -> Result<Vec<Outcome>> {
    let registry = ResourceRegistry::new(settings.config.caching.clone());

    let mut caches = HashMap::new();
    for config in &settings.resources {
        let cache = registry
            .resource(DirectoryResource::new(config))
            .with_context(|| format!("Could not set up resource `{}`", config.name))?;
        caches.insert(config.name.as_str(), cache);
    }

    let lookups = settings.keys.iter().map(|request| {
        let cache = caches.get(request.resource.as_str());
        async move {
            let cache = cache
                .with_context(|| format!("Unknown resource `{}`", request.resource))?;
            let outcome = cache.load(&request.key).await;
            anyhow::Ok(Outcome::new(request, outcome))
        }
    });

    let outcomes = future::join_all(lookups)
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        keys = outcomes.len(),
        failed = outcomes.iter().filter(|o| o.error.is_some()).count(),
        "Resolved keys"
    );
    Ok(outcomes)
}
