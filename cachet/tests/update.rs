//! Update directives applied to other keys after a mutation.

mod common;

use cachet::{CachePolicy, CacheStatus, UpdateDirective};
use cachet_backend::Backend;
use cachet_core::clock::MockClock;
use cachet_core::{CacheEntry, CacheKey, Request, Response};
use common::{Transport, get, memory_cache};
use http::StatusCode;

fn list() -> Request {
    get("/todos").id("list")
}

fn create(body: &'static str) -> Request {
    Request::post("https://api.example.com/todos").data(serde_json::json!({ "title": body }))
}

#[tokio::test]
async fn test_delete_directive_invalidates_list() {
    let clock = MockClock::new();
    let cache = memory_cache(&clock, CachePolicy::default());
    let reads = Transport::new(|_, call| Ok(Response::ok(format!("list v{call}"))));

    cache.execute(list(), reads.clone()).await.unwrap();
    assert_eq!(cache.execute(list(), reads.clone()).await.unwrap().status(), CacheStatus::Hit);

    let policy = CachePolicy::default().update(CacheKey::from_id("list"), UpdateDirective::Delete);
    let created = cache
        .execute_with(create("c"), &policy, Transport::ok("created"))
        .await
        .unwrap();
    assert_eq!(created.status(), CacheStatus::Miss);
    assert!(cache.backend().find(&CacheKey::from_id("list")).await.unwrap().is_none());

    let refreshed = cache.execute(list(), reads.clone()).await.unwrap();
    assert_eq!(refreshed.status(), CacheStatus::Miss);
    assert_eq!(refreshed.response.body, "list v2");
}

#[tokio::test]
async fn test_transform_directive_rewrites_entry() {
    let clock = MockClock::new();
    let cache = memory_cache(&clock, CachePolicy::default());
    let reads = Transport::ok("a,b");

    cache.execute(list(), reads.clone()).await.unwrap();

    let append = UpdateDirective::transform(|entry, response| {
        let mut value = entry.into_value()?;
        let mut body = value.response.body.to_vec();
        body.push(b',');
        body.extend_from_slice(&response.body);
        value.response.body = body.into();
        Some(CacheEntry::Cached(value))
    });
    let policy = CachePolicy::default().update(CacheKey::from_id("list"), append);
    cache
        .execute_with(create("c"), &policy, Transport::ok("c"))
        .await
        .unwrap();

    let hit = cache.execute(list(), reads.clone()).await.unwrap();
    assert_eq!(hit.status(), CacheStatus::Hit);
    assert_eq!(hit.response.body, "a,b,c");
    assert_eq!(reads.calls(), 1);
}

#[tokio::test]
async fn test_transform_returning_none_deletes() {
    let clock = MockClock::new();
    let cache = memory_cache(&clock, CachePolicy::default());
    let reads = Transport::ok("a,b");

    cache.execute(list(), reads.clone()).await.unwrap();

    let policy = CachePolicy::default().update(
        CacheKey::from_id("list"),
        UpdateDirective::transform(|_, _| None),
    );
    cache
        .execute_with(create("c"), &policy, Transport::ok("c"))
        .await
        .unwrap();

    assert!(cache.backend().is_empty());
}

#[tokio::test]
async fn test_failed_mutation_leaves_entries_alone() {
    let clock = MockClock::new();
    let cache = memory_cache(&clock, CachePolicy::default());
    let reads = Transport::ok("a,b");

    cache.execute(list(), reads.clone()).await.unwrap();

    let policy = CachePolicy::default().update(CacheKey::from_id("list"), UpdateDirective::Delete);
    let error = cache
        .execute_with(
            create("c"),
            &policy,
            Transport::status(StatusCode::UNPROCESSABLE_ENTITY),
        )
        .await
        .unwrap_err();

    assert_eq!(error.response().unwrap().status, StatusCode::UNPROCESSABLE_ENTITY);
    let hit = cache.execute(list(), reads.clone()).await.unwrap();
    assert_eq!(hit.status(), CacheStatus::Hit);
}

#[tokio::test]
async fn test_cacheable_read_applies_directives() {
    let clock = MockClock::new();
    let cache = memory_cache(&clock, CachePolicy::default());

    cache.execute(list(), Transport::ok("a,b")).await.unwrap();

    let policy = CachePolicy::default().update(CacheKey::from_id("list"), UpdateDirective::Delete);
    let detail = cache
        .execute_with(get("/todos/1"), &policy, Transport::ok("a"))
        .await
        .unwrap();

    assert_eq!(detail.status(), CacheStatus::Miss);
    assert!(cache.backend().find(&CacheKey::from_id("list")).await.unwrap().is_none());
    assert!(cache.backend().find(&detail.id).await.unwrap().is_some());
}
