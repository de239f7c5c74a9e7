//! Concurrency behaviour of the tag cache: single-flight, failure fan-out,
//! stale publishes and cancellation.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bookshelf::cache::{CacheError, CacheKey, CacheTag, ResourceKind, TagCache};
use bytes::Bytes;
use tokio::sync::{Barrier, Notify};

fn books_key() -> CacheKey {
    CacheKey::list(ResourceKind::Books, 1, 3)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_run_one_producer() {
    let cache = TagCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_compute(books_key(), &CacheTag::ALL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, io::Error>(Bytes::from_static(b"[]"))
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        let payload = task.await.expect("task").expect("payload");
        assert_eq!(payload, Bytes::from_static(b"[]"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.contains_key(&books_key()));
    assert_eq!(cache.stats().in_flight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn producer_failure_reaches_every_waiter_and_is_not_cached() {
    let cache = TagCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_compute(books_key(), &CacheTag::ALL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err::<Bytes, _>(io::Error::other("store offline"))
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        let err = task.await.expect("task").expect_err("producer failed");
        let source = err.producer_error().expect("producer error");
        assert_eq!(source.to_string(), "store offline");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.is_empty());

    let retried = cache
        .get_or_compute(books_key(), &CacheTag::ALL, || async {
            Ok::<_, io::Error>(Bytes::from_static(b"[1]"))
        })
        .await
        .expect("retry succeeds");
    assert_eq!(retried, Bytes::from_static(b"[1]"));
}

#[tokio::test]
async fn payload_computed_across_invalidation_is_not_stored() {
    let cache = TagCache::default();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let task = {
        let cache = cache.clone();
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        tokio::spawn(async move {
            cache
                .get_or_compute(books_key(), &CacheTag::ALL, move || async move {
                    started.notify_one();
                    release.notified().await;
                    Ok::<_, io::Error>(Bytes::from_static(b"old"))
                })
                .await
        })
    };

    started.notified().await;
    assert_eq!(cache.invalidate_tag(CacheTag::Authors), 0);
    release.notify_one();

    let payload = task.await.expect("task").expect("payload");
    assert_eq!(payload, Bytes::from_static(b"old"));
    assert!(!cache.contains_key(&books_key()));
}

#[tokio::test]
async fn caller_after_invalidation_does_not_join_stale_flight() {
    let cache = TagCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let stale = {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        tokio::spawn(async move {
            cache
                .get_or_compute(books_key(), &CacheTag::ALL, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    started.notify_one();
                    release.notified().await;
                    Ok::<_, io::Error>(Bytes::from_static(b"old"))
                })
                .await
        })
    };

    started.notified().await;
    cache.invalidate_tag(CacheTag::Books);

    let fresh_calls = Arc::clone(&calls);
    let fresh = cache
        .get_or_compute(books_key(), &CacheTag::ALL, move || async move {
            fresh_calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(Bytes::from_static(b"new"))
        })
        .await
        .expect("fresh payload");
    assert_eq!(fresh, Bytes::from_static(b"new"));

    release.notify_one();
    let old = stale.await.expect("task").expect("stale payload");
    assert_eq!(old, Bytes::from_static(b"old"));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let cached = cache
        .get_or_compute(books_key(), &CacheTag::ALL, || async {
            Err::<Bytes, _>(io::Error::other("should be a hit"))
        })
        .await
        .expect("cache hit");
    assert_eq!(cached, Bytes::from_static(b"new"));
}

#[tokio::test]
async fn cancelled_caller_releases_the_flight() {
    let cache = TagCache::default();
    let started = Arc::new(Notify::new());

    let task = {
        let cache = cache.clone();
        let started = Arc::clone(&started);
        tokio::spawn(async move {
            cache
                .get_or_compute(books_key(), &CacheTag::ALL, move || async move {
                    started.notify_one();
                    std::future::pending::<Result<Bytes, io::Error>>().await
                })
                .await
        })
    };

    started.notified().await;
    assert_eq!(cache.stats().in_flight, 1);

    task.abort();
    let joined = task.await;
    assert!(joined.is_err_and(|err| err.is_cancelled()));
    assert_eq!(cache.stats().in_flight, 0);

    let payload = cache
        .get_or_compute(books_key(), &CacheTag::ALL, || async {
            Ok::<_, io::Error>(Bytes::from_static(b"[]"))
        })
        .await
        .expect("new flight runs");
    assert_eq!(payload, Bytes::from_static(b"[]"));
}

#[tokio::test]
async fn invalidating_one_tag_keeps_entries_without_it() {
    let cache = TagCache::default();
    let authors_only = CacheKey::list(ResourceKind::Authors, 1, 3);

    cache
        .get_or_compute(authors_only.clone(), &[CacheTag::Authors], || async {
            Ok::<_, io::Error>(Bytes::from_static(b"[]"))
        })
        .await
        .expect("payload");

    assert_eq!(cache.invalidate_tag(CacheTag::Books), 0);
    assert!(cache.contains_key(&authors_only));

    assert_eq!(cache.invalidate_tag(CacheTag::Authors), 1);
    assert!(!cache.contains_key(&authors_only));
}

#[tokio::test]
async fn timed_out_producer_is_reported() {
    let cache = TagCache::new(bookshelf::cache::CacheConfig {
        enabled: true,
        producer_timeout: Duration::from_millis(20),
    });

    let err = cache
        .get_or_compute(books_key(), &CacheTag::ALL, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, io::Error>(Bytes::new())
        })
        .await
        .expect_err("timeout");

    assert!(matches!(err, CacheError::Timeout(_)));
    assert!(cache.is_empty());
    assert_eq!(cache.stats().in_flight, 0);
}
