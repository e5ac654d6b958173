use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{Method, Request, StatusCode},
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use scriptorium::cache::{
    CacheConfig, CacheKey, CachedData, Expiry, KeyValueStore, MemoryStore, QueryCacheInterceptor,
    QueryCacheProvider,
};
use scriptorium::infra::http::{HttpState, build_router};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn cache_and_http_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(QueryCacheProvider::new(
        store.clone(),
        CacheConfig::default(),
    ));
    let interceptor = QueryCacheInterceptor::new(provider.clone());

    // miss + insert, then hit
    let key = CacheKey::new("Q-metrics", ["Table:Post"]);
    for _ in 0..2 {
        interceptor
            .read_through(&key, None, || async {
                Ok::<_, Infallible>(Some(CachedData::scalar(json!(7))))
            })
            .await
            .expect("read");
    }

    // invalidation through the dependency set
    interceptor
        .on_write(&CacheKey::new("W-metrics", ["Table:Post"]))
        .await
        .expect("invalidation outcome");

    // fall-through on an entry that no longer decodes
    let corrupt = CacheKey::new("Q-corrupt", ["Table:Post"]);
    store
        .set(
            &provider.entry_key(&corrupt.key_hash),
            Bytes::from_static(b"not json"),
            Expiry::Absolute(Duration::from_secs(60)),
        )
        .await
        .expect("seed corrupt entry");
    interceptor
        .read_through(&corrupt, None, || async { Ok::<_, Infallible>(None) })
        .await
        .expect("read");

    // an unusable key bypasses the cache without counting as a fall-through
    let blank = CacheKey::new("", ["Table:Post"]);
    interceptor
        .read_through(&blank, None, || async { Ok::<_, Infallible>(None) })
        .await
        .expect("read");

    // handler timing histogram
    let app = build_router(HttpState {
        cache: provider,
        drive: None,
    });
    let request = Request::builder()
        .method(Method::GET)
        .uri("/SetCookie?name=theme&value=dark")
        .body(Body::empty())
        .expect("request should build");
    let response = app.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let fallthroughs: u64 = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| {
            composite_key.key().name() == "scriptorium_query_cache_fallthrough_total"
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => *count,
            _ => 0,
        })
        .sum();
    assert_eq!(fallthroughs, 1);

    let expected = [
        "scriptorium_query_cache_hit_total",
        "scriptorium_query_cache_miss_total",
        "scriptorium_query_cache_insert_total",
        "scriptorium_query_cache_invalidate_total",
        "scriptorium_query_cache_fallthrough_total",
        "scriptorium_http_action_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
