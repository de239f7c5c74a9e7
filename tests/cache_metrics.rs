use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use bookshelf::cache::{CacheKey, CacheTag, ResourceKind, TagCache};
use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use tokio::sync::Notify;

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = TagCache::default();
    let books = CacheKey::list(ResourceKind::Books, 1, 3);
    let authors = CacheKey::list(ResourceKind::Authors, 1, 3);

    // miss then hit
    for _ in 0..2 {
        cache
            .get_or_compute(books.clone(), &CacheTag::ALL, || async {
                Ok::<_, io::Error>(Bytes::from_static(b"[]"))
            })
            .await
            .expect("payload");
    }

    // producer failure
    let _ = cache
        .get_or_compute(authors.clone(), &CacheTag::ALL, || async {
            Err::<Bytes, _>(io::Error::other("store offline"))
        })
        .await;

    // stale discard
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let flight = {
        let cache = cache.clone();
        let authors = authors.clone();
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        tokio::spawn(async move {
            cache
                .get_or_compute(authors, &CacheTag::ALL, move || async move {
                    started.notify_one();
                    release.notified().await;
                    Ok::<_, io::Error>(Bytes::from_static(b"[]"))
                })
                .await
        })
    };
    started.notified().await;
    cache.invalidate_tag(CacheTag::Authors);
    release.notify_one();
    flight.await.expect("task").expect("payload");

    cache.invalidate_all();

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "bookshelf_cache_hit_total",
        "bookshelf_cache_miss_total",
        "bookshelf_cache_producer_failure_total",
        "bookshelf_cache_stale_discard_total",
        "bookshelf_cache_invalidated_total",
        "bookshelf_cache_entries",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
