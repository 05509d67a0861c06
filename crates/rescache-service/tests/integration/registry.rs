use futures::future::{FutureExt, LocalBoxFuture};
use rescache_service::config::{CachingConfig, StaleCompletionPolicy};
use rescache_service::resource::{RegistryError, Resolution, ResourceDefinition, ResourceRegistry};
use rescache_test::run_local;

use crate::utils::{TestResource, ok};

/// Resolves every key to its length.
struct LengthResource;

impl ResourceDefinition for LengthResource {
    type Output = usize;
    type Error = ();

    fn name(&self) -> &str {
        "values"
    }

    fn resolve(&self, key: &str) -> LocalBoxFuture<'static, Result<usize, ()>> {
        futures::future::ready(Ok(key.len())).boxed_local()
    }
}

#[test]
fn test_type_mismatch() {
    rescache_test::setup();
    let registry = ResourceRegistry::default();
    let (resource, _) = TestResource::new("values");
    registry.resource(resource).unwrap();

    let err = registry.resource(LengthResource).unwrap_err();
    assert!(matches!(
        &err,
        RegistryError::TypeMismatch { name, .. } if name == "values"
    ));
    assert!(err.to_string().starts_with("namespace `values` stores `"));
}

#[test]
fn test_namespaces() {
    rescache_test::setup();
    let registry = ResourceRegistry::new(CachingConfig {
        stale_completions: StaleCompletionPolicy::Overwrite,
    });
    assert!(registry.namespaces().is_empty());
    assert_eq!(
        registry.config().stale_completions,
        StaleCompletionPolicy::Overwrite
    );

    let (first, _) = TestResource::new("first");
    let (second, _) = TestResource::new("second");
    registry.resource(first).unwrap();
    registry.resource(second).unwrap();
    let (again, _) = TestResource::new("first");
    registry.resource(again).unwrap();

    let mut names = registry.namespaces();
    names.sort();
    assert_eq!(names, ["first", "second"]);
}

#[tokio::test]
async fn test_shared_namespace() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (first, first_resolver) = TestResource::new("values");
        let (second, second_resolver) = TestResource::new("values");
        let first = registry.resource(first).unwrap();
        let second = registry.resource(second).unwrap();

        let handle = match first.get("k") {
            Resolution::Pending(handle) => handle,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(second.get("k"), Resolution::Pending(handle.clone()));

        first_resolver.complete("k", ok("v"));
        handle.await;
        assert_eq!(second.get("k"), Resolution::Ready("v".to_owned()));
        assert_eq!(first_resolver.calls("k"), 1);
        assert_eq!(second_resolver.total_calls(), 0);

        // removal through one cache is visible through the other
        first.remove("k");
        assert!(second.get("k").is_pending());
        assert_eq!(second_resolver.calls("k"), 1);
    })
    .await;
}

#[tokio::test]
async fn test_static_namespaces_are_separate() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (observable, _) = TestResource::new("values");
        let cache = registry.resource(observable).unwrap();
        cache.set_resolved("k", ok("observable"));

        // a static resource of another type under the same name is fine
        let lengths = registry.static_resource(LengthResource).unwrap();
        assert_eq!(lengths.load("k").await, Ok(1));
        assert_eq!(cache.get("k"), Resolution::Ready("observable".to_owned()));
        assert_eq!(registry.namespaces(), ["values"]);
    })
    .await;
}
