use std::cell::Cell;
use std::rc::Rc;

use rescache_service::CancellationToken;
use rescache_service::config::{CachingConfig, StaleCompletionPolicy};
use rescache_service::resource::{Resolution, ResolutionState, ResourceRegistry};
use rescache_test::run_local;

use crate::utils::{TestError, TestResource, err, event_log, ok};

fn pending<T, E>(resolution: Resolution<T, E>) -> rescache_service::resource::PendingHandle {
    match resolution {
        Resolution::Pending(handle) => handle,
        _ => panic!("expected a pending resolution"),
    }
}

#[tokio::test]
async fn test_get_resolves_once() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let handle = pending(cache.get("k"));
        for _ in 0..5 {
            assert_eq!(pending(cache.get("k")).generation(), handle.generation());
        }
        assert_eq!(resolver.calls("k"), 1);

        assert!(resolver.complete("k", ok("v")));
        handle.await;

        assert_eq!(cache.get("k"), Resolution::Ready("v".to_owned()));
        assert_eq!(cache.get("k"), Resolution::Ready("v".to_owned()));
        assert_eq!(resolver.total_calls(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_failure_is_cached() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let handle = pending(cache.get("k"));
        resolver.complete("k", err("boom"));
        handle.await;

        for _ in 0..3 {
            assert_eq!(
                cache.get("k"),
                Resolution::Failed(TestError("boom".to_owned()))
            );
        }
        assert_eq!(cache.load("k").await, err("boom"));
        assert_eq!(resolver.calls("k"), 1);
    })
    .await;
}

#[tokio::test]
async fn test_keys_resolve_independently() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let a = pending(cache.get("a"));
        let b = pending(cache.get("b"));
        assert_ne!(a.generation(), b.generation());

        resolver.complete("b", ok("2"));
        b.await;
        assert_eq!(cache.get("b"), Resolution::Ready("2".to_owned()));
        assert!(cache.get("a").is_pending());

        resolver.complete("a", ok("1"));
        a.await;
        assert_eq!(cache.get("a"), Resolution::Ready("1".to_owned()));
    })
    .await;
}

#[tokio::test]
async fn test_transitions_are_published() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let (log, callback) = event_log();
        cache.store().subscribe(callback);

        let handle = pending(cache.get("a"));
        resolver.complete("a", ok("1"));
        handle.await;
        cache.set_resolved("a", err("manual"));
        cache.remove("a");
        cache.store().clear();

        insta::assert_debug_snapshot!(&*log.borrow(), @r###"
        [
            "inserted a: pending#0",
            "updated a: pending#0 -> resolved(1)",
            "updated a: resolved(1) -> failed(manual)",
            "removed a: failed(manual)",
            "cleared",
        ]
        "###);
    })
    .await;
}

#[tokio::test]
async fn test_override_pending() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let handle = pending(cache.get("k"));
        cache.set_resolved("k", ok("manual"));
        assert_eq!(cache.get("k"), Resolution::Ready("manual".to_owned()));

        // the superseded resolution settles late, and is dropped
        resolver.complete("k", ok("late"));
        handle.await;
        assert_eq!(cache.get("k"), Resolution::Ready("manual".to_owned()));
        assert_eq!(resolver.calls("k"), 1);
    })
    .await;
}

#[tokio::test]
async fn test_override_pending_with_overwrite_policy() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::new(CachingConfig {
            stale_completions: StaleCompletionPolicy::Overwrite,
        });
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let handle = pending(cache.get("k"));
        cache.set_resolved("k", ok("manual"));
        assert_eq!(cache.get("k"), Resolution::Ready("manual".to_owned()));

        resolver.complete("k", ok("late"));
        handle.await;
        assert_eq!(cache.get("k"), Resolution::Ready("late".to_owned()));
    })
    .await;
}

#[tokio::test]
async fn test_override_terminal() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        cache.set_resolved("k", err("nope"));
        assert_eq!(cache.load("k").await, err("nope"));
        cache.set_resolved("k", ok("yes"));
        assert_eq!(cache.load("k").await, ok("yes"));
        assert_eq!(resolver.total_calls(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_remove_restarts_resolution() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let first = pending(cache.get("k"));
        assert!(cache.remove("k"));
        assert!(!cache.remove("k"));
        let second = pending(cache.get("k"));
        assert_eq!(resolver.calls("k"), 2);

        // the first resolution is no longer current
        resolver.complete("k", ok("old"));
        first.await;
        assert_eq!(
            cache.peek("k").and_then(|s| s.pending_generation()),
            Some(second.generation())
        );

        resolver.complete("k", ok("new"));
        second.await;
        assert_eq!(cache.get("k"), Resolution::Ready("new".to_owned()));
    })
    .await;
}

#[tokio::test]
async fn test_load_waits_for_resolution() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let (first, second, ()) = futures::join!(cache.load("k"), cache.load("k"), async {
            tokio::task::yield_now().await;
            resolver.complete("k", ok("v"));
        });

        assert_eq!(first, ok("v"));
        assert_eq!(second, ok("v"));
        assert_eq!(resolver.calls("k"), 1);
    })
    .await;
}

#[tokio::test]
async fn test_load_observes_override() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        // the resolution itself never settles
        let (loaded, ()) = futures::join!(cache.load("k"), async {
            tokio::task::yield_now().await;
            cache.set_resolved("k", ok("manual"));
        });

        assert_eq!(loaded, ok("manual"));
        assert_eq!(resolver.outstanding("k"), 1);
    })
    .await;
}

#[tokio::test]
async fn test_subscribe_to_key() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let token = CancellationToken::new();
        let (log, callback) = event_log();
        cache.subscribe_to_key("a", callback, Some(token.clone()));

        let a = pending(cache.get("a"));
        let b = pending(cache.get("b"));
        resolver.complete("a", ok("1"));
        resolver.complete("b", ok("2"));
        a.await;
        b.await;
        cache.store().clear();

        token.cancel();
        cache.set_resolved("a", ok("3"));

        assert_eq!(
            *log.borrow(),
            vec![
                "inserted a: pending#0".to_owned(),
                "updated a: pending#0 -> resolved(1)".to_owned(),
                "cleared".to_owned(),
            ]
        );
    })
    .await;
}

#[tokio::test]
async fn test_watch() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        let notified = Rc::new(Cell::new(0));
        let counter = Rc::clone(&notified);
        let token = CancellationToken::new();

        let handle = pending(cache.watch(
            "k",
            move |_| counter.set(counter.get() + 1),
            token.clone(),
        ));
        assert_eq!(notified.get(), 0);

        resolver.complete("k", ok("v"));
        handle.await;
        assert_eq!(notified.get(), 1);

        // the consumer is gone
        token.cancel();
        cache.set_resolved("k", ok("w"));
        assert_eq!(notified.get(), 1);
        assert_eq!(cache.store().subscriber_count(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_watch_with_cleanup() {
    rescache_test::setup();
    run_local(async {
        let registry = ResourceRegistry::default();
        let (resource, resolver) = TestResource::new("values");
        let cache = registry.resource(resource).unwrap();

        cache.set_resolved("k", ok("v"));
        let token = CancellationToken::new();
        let (resolution, guard) = cache.watch_with_cleanup("k", |_| {}, token.clone());
        assert_eq!(resolution, Resolution::Ready("v".to_owned()));

        token.cancel();
        drop(guard);
        assert!(cache.peek("k").is_none());

        assert!(cache.get("k").is_pending());
        assert_eq!(resolver.calls("k"), 1);

        let (_, guard) = cache.watch_with_cleanup("k", |_| {}, CancellationToken::new());
        guard.disarm();
        assert!(matches!(cache.peek("k"), Some(ResolutionState::Pending(_))));
    })
    .await;
}

#[test]
fn test_get_without_runtime() {
    rescache_test::setup();
    let registry = ResourceRegistry::default();
    let (resource, resolver) = TestResource::new("values");
    let cache = registry.resource(resource).unwrap();

    let handle = pending(cache.get("k"));
    assert!(resolver.complete("k", ok("v")));
    futures::executor::block_on(handle);

    assert_eq!(cache.get("k"), Resolution::Ready("v".to_owned()));
    assert_eq!(resolver.calls("k"), 1);
}
