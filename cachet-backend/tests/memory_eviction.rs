//! Tests for memory backend eviction.

use std::time::Duration;

use cachet_backend::{Backend, DeleteStatus, MemoryBackend};
use cachet_core::clock::MockClock;
use cachet_core::{CacheEntry, CacheKey, CachedValue, Clock, LoadingEntry, Response};

fn make_key(id: u32) -> CacheKey {
    CacheKey::new(format!("method=get&url=/items/{id}"))
}

fn make_entry(clock: &MockClock, ttl: Duration) -> CacheEntry {
    CacheEntry::Cached(CachedValue::new(Response::ok("item"), clock.now(), ttl))
}

#[tokio::test]
async fn test_max_entries_plus_one_stays_bounded() {
    let clock = MockClock::new();
    let backend = MemoryBackend::builder()
        .max_entries(3)
        .clock(clock.clone())
        .build();

    for i in 1..=4 {
        backend
            .set(&make_key(i), make_entry(&clock, Duration::from_secs(60)))
            .await
            .unwrap();
    }

    assert_eq!(backend.len(), 3);
    assert!(backend.find(&make_key(1)).await.unwrap().is_none(), "oldest entry is evicted first");
    for i in 2..=4 {
        assert!(backend.find(&make_key(i)).await.unwrap().is_some(), "entry {i} should remain");
    }
}

#[tokio::test]
async fn test_expired_entries_are_cleaned_before_fifo() {
    let clock = MockClock::new();
    let backend = MemoryBackend::builder()
        .max_entries(3)
        .clock(clock.clone())
        .build();

    backend.set(&make_key(1), make_entry(&clock, Duration::from_secs(60))).await.unwrap();
    backend.set(&make_key(2), make_entry(&clock, Duration::from_secs(1))).await.unwrap();
    backend.set(&make_key(3), CacheEntry::Empty).await.unwrap();

    clock.advance(Duration::from_secs(2));
    backend.set(&make_key(4), make_entry(&clock, Duration::from_secs(60))).await.unwrap();

    // The expired and empty entries make room, so the oldest live entry survives.
    assert_eq!(backend.keys(), vec![make_key(1), make_key(4)]);
}

#[tokio::test]
async fn test_expired_loading_markers_are_cleaned() {
    let clock = MockClock::new();
    let backend = MemoryBackend::builder()
        .max_entries(2)
        .clock(clock.clone())
        .build();

    let deadline = clock.now() + chrono::Duration::seconds(1);
    backend
        .set(&make_key(1), CacheEntry::Loading(LoadingEntry::new(None, Some(deadline))))
        .await
        .unwrap();
    backend.set(&make_key(2), make_entry(&clock, Duration::from_secs(60))).await.unwrap();

    clock.advance(Duration::from_secs(5));
    backend.set(&make_key(3), make_entry(&clock, Duration::from_secs(60))).await.unwrap();

    assert_eq!(backend.keys(), vec![make_key(2), make_key(3)]);
}

#[tokio::test]
async fn test_rewrite_moves_entry_to_back() {
    let clock = MockClock::new();
    let backend = MemoryBackend::builder()
        .max_entries(2)
        .clock(clock.clone())
        .build();

    backend.set(&make_key(1), make_entry(&clock, Duration::from_secs(60))).await.unwrap();
    backend.set(&make_key(2), make_entry(&clock, Duration::from_secs(60))).await.unwrap();
    backend.set(&make_key(1), make_entry(&clock, Duration::from_secs(60))).await.unwrap();
    backend.set(&make_key(3), make_entry(&clock, Duration::from_secs(60))).await.unwrap();

    assert_eq!(backend.keys(), vec![make_key(1), make_key(3)]);
}

#[tokio::test]
async fn test_remove_reports_status() {
    let backend = MemoryBackend::default();
    let clock = MockClock::new();
    backend.set(&make_key(1), make_entry(&clock, Duration::from_secs(60))).await.unwrap();

    assert_eq!(backend.remove(&make_key(1)).await.unwrap(), DeleteStatus::Deleted(1));
    assert_eq!(backend.remove(&make_key(1)).await.unwrap(), DeleteStatus::Missing);
}

#[test]
fn test_zero_capacity_fails_validation() {
    let backend = MemoryBackend::builder().max_entries(0).build();
    assert!(backend.validate().is_err());
    assert!(MemoryBackend::default().validate().is_ok());
}
