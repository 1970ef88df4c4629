//! End-to-end lifecycles across backends.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cachet::{Cache, CachePolicy, CacheStatus};
use cachet_backend::{Backend, MemoryArea, QuotaBackend};
use cachet_core::clock::MockClock;
use cachet_core::{CacheEntry, Response};
use cachet_moka::MokaBackend;
use common::{Transport, TransportError, get, memory_cache, spans};
use http::StatusCode;
use http::header::IF_NONE_MATCH;
use tracing::instrument::WithSubscriber;

/// Origin serving an ETagged document; `down` makes it answer 503.
fn origin(down: Arc<AtomicBool>) -> Transport {
    Transport::new(move |request, call| {
        if down.load(Ordering::SeqCst) {
            return Ok(Response::new(StatusCode::SERVICE_UNAVAILABLE, "maintenance"));
        }
        if request.headers.get(IF_NONE_MATCH).is_some_and(|tag| tag == "\"doc\"") {
            return Ok(Response::new(StatusCode::NOT_MODIFIED, "")
                .with_header("cache-control", "max-age=60"));
        }
        Ok(Response::ok(format!("doc {call}"))
            .with_header("etag", "\"doc\"")
            .with_header("cache-control", "max-age=60"))
    })
}

#[tokio::test]
async fn test_full_lifecycle() {
    let clock = MockClock::new();
    let cache = memory_cache(&clock, CachePolicy::default());
    let down = Arc::new(AtomicBool::new(false));
    let transport = origin(Arc::clone(&down));

    let miss = cache.execute(get("/doc"), transport.clone()).await.unwrap();
    assert_eq!(miss.status(), CacheStatus::Miss);

    clock.advance(Duration::from_secs(30));
    let hit = cache.execute(get("/doc"), transport.clone()).await.unwrap();
    assert_eq!(hit.status(), CacheStatus::Hit);
    assert_eq!(transport.calls(), 1);

    clock.advance(Duration::from_secs(60));
    let revalidated = cache.execute(get("/doc"), transport.clone()).await.unwrap();
    assert_eq!(revalidated.status(), CacheStatus::Hit);
    assert_eq!(revalidated.response.body, "doc 1");
    assert_eq!(transport.calls(), 2);

    clock.advance(Duration::from_secs(120));
    down.store(true, Ordering::SeqCst);
    let stale = cache.execute(get("/doc"), transport.clone()).await.unwrap();
    assert_eq!(stale.status(), CacheStatus::Stale);
    assert_eq!(stale.response.body, "doc 1");

    down.store(false, Ordering::SeqCst);
    let recovered = cache.execute(get("/doc"), transport.clone()).await.unwrap();
    assert_eq!(recovered.status(), CacheStatus::Hit);
    assert_eq!(transport.calls(), 4);

    cache.invalidate(&recovered.id).await;
    let refetched = cache.execute(get("/doc"), transport.clone()).await.unwrap();
    assert_eq!(refetched.status(), CacheStatus::Miss);
    assert_eq!(refetched.response.body, "doc 5");
}

#[tokio::test]
async fn test_quota_backend_round_trip() {
    let clock = MockClock::new();
    let cache: Cache<_, TransportError> = Cache::builder()
        .backend(QuotaBackend::new(MemoryArea::new(64 * 1024)).with_clock(clock.clone()))
        .clock(clock.clone())
        .build()
        .unwrap();
    let transport = origin(Arc::new(AtomicBool::new(false)));

    let miss = cache.execute(get("/doc"), transport.clone()).await.unwrap();
    let hit = cache.execute(get("/doc"), transport.clone()).await.unwrap();

    assert_eq!(miss.status(), CacheStatus::Miss);
    assert_eq!(hit.status(), CacheStatus::Hit);
    assert_eq!(hit.response.body, "doc 1");
    assert_eq!(hit.response.etag().unwrap(), "\"doc\"");
    assert!(cache.backend().area().used_bytes() > 0);
}

#[tokio::test]
async fn test_quota_exhaustion_still_answers() {
    let clock = MockClock::new();
    let cache: Cache<_, TransportError> = Cache::builder()
        .backend(QuotaBackend::new(MemoryArea::new(512)).with_clock(clock.clone()))
        .clock(clock.clone())
        .build()
        .unwrap();
    let large = "x".repeat(4096);
    let transport = Transport::new(move |_, _| Ok(Response::ok(large.clone())));

    let first = cache.execute(get("/big"), transport.clone()).await.unwrap();
    let second = cache.execute(get("/big"), transport.clone()).await.unwrap();

    assert_eq!(first.response.body.len(), 4096);
    assert_eq!(second.status(), CacheStatus::Miss);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_moka_backend_round_trip() {
    let clock = MockClock::new();
    let cache: Cache<_, TransportError> = Cache::builder()
        .backend(MokaBackend::builder().max_entries(100).build())
        .clock(clock.clone())
        .build()
        .unwrap();
    let transport = origin(Arc::new(AtomicBool::new(false)));

    let miss = cache.execute(get("/doc"), transport.clone()).await.unwrap();
    let hit = cache.execute(get("/doc"), transport.clone()).await.unwrap();

    assert_eq!(miss.status(), CacheStatus::Miss);
    assert_eq!(hit.status(), CacheStatus::Hit);
    assert!(matches!(
        cache.backend().find(&hit.id).await.unwrap(),
        Some(CacheEntry::Cached(_))
    ));
}

#[tokio::test]
async fn test_execute_span_carries_key() {
    let collector = spans::collector();
    let clock = MockClock::new();
    let cache = memory_cache(&clock, CachePolicy::default());

    let response = cache
        .execute(get("/doc"), Transport::ok("doc"))
        .with_subscriber(collector.dispatch().clone())
        .await
        .unwrap();

    let captured = collector.spans();
    let span = captured
        .iter()
        .find(|span| span.name == "cache.execute")
        .expect("execute span recorded");
    assert_eq!(span.field("key"), Some(response.id.as_str()));
    assert_eq!(span.field("method"), Some("GET"));
}
