use rescache_service::resource::{Resolution, ResourceRegistry};
use rescache_test::run_local;

use crate::utils::{TestResource, err, ok};

#[tokio::test]
async fn test_static_resolves_once() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("static");
        let resource = registry.static_resource(resource).unwrap();
        assert!(resource.is_empty());

        let handle = match resource.get("k") {
            Resolution::Pending(handle) => handle,
            other => panic!("unexpected {other:?}"),
        };
        assert!(resource.get("k").is_pending());
        assert_eq!(resolver.calls("k"), 1);
        assert_eq!(resource.len(), 1);

        resolver.complete("k", ok("v"));
        handle.await;
        assert_eq!(resource.get("k"), Resolution::Ready("v".to_owned()));
        assert_eq!(resolver.calls("k"), 1);
    })
    .await;
}

#[tokio::test]
async fn test_static_load() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("static");
        let resource = registry.static_resource(resource).unwrap();

        let (loaded, again, ()) = futures::join!(resource.load("k"), resource.load("k"), async {
            tokio::task::yield_now().await;
            resolver.complete("k", err("gone"));
        });
        assert_eq!(loaded, err("gone"));
        assert_eq!(again, err("gone"));
        assert_eq!(resolver.calls("k"), 1);
    })
    .await;
}

#[tokio::test]
async fn test_static_remove() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("static");
        let resource = registry.static_resource(resource).unwrap();

        let stale = match resource.get("k") {
            Resolution::Pending(handle) => handle,
            other => panic!("unexpected {other:?}"),
        };
        assert!(resource.remove("k"));
        assert!(!resource.remove("k"));
        assert!(resource.get("k").is_pending());

        resolver.complete("k", ok("stale"));
        stale.await;
        assert!(resource.get("k").is_pending());

        resolver.complete("k", ok("fresh"));
        assert_eq!(resource.load("k").await, ok("fresh"));
        assert_eq!(resolver.calls("k"), 2);
    })
    .await;
}
