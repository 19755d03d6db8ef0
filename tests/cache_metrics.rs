mod support;

use std::collections::HashSet;
use std::time::Duration;

use lexquery::api::{CreateEvent, FetchEvents};
use lexquery::cache::CacheConfig;
use lexquery::infra::telemetry;
use lexquery::types::NewEvent;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use serial_test::serial;

use support::{
    GatedTransport, StubTransport, client_with, client_with_config, drain_tasks, event_json,
    next_call,
};

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    // miss, hit, fetch latency, entry gauge
    let transport = StubTransport::new(|request| match request.method.as_str() {
        "GET" => Ok(json!([event_json(1, "Meeting")])),
        _ => Ok(event_json(2, "Hearing")),
    });
    let client = client_with(transport.clone());
    client.query(&FetchEvents, ()).await.expect("fingerprint");
    client.query(&FetchEvents, ()).await.expect("fingerprint");

    // invalidation refetch
    let watch = client
        .watch(FetchEvents, (), |_| {})
        .await
        .expect("fingerprint");
    client
        .mutate(&CreateEvent, NewEvent::titled("Hearing"))
        .await
        .expect("create succeeds");

    watch.unsubscribe();

    // eviction
    let evicting = client_with_config(
        transport,
        CacheConfig::default().with_grace_period(Duration::ZERO),
    );
    evicting.query(&FetchEvents, ()).await.expect("fingerprint");
    tokio::time::sleep(Duration::from_millis(5)).await;
    drain_tasks().await;
    assert!(evicting.store().is_empty());

    // in-flight join and discarded response
    let (gated, mut calls) = GatedTransport::new();
    let gated_client = client_with(gated);
    let first = tokio::spawn({
        let client = gated_client.clone();
        async move { client.query(&FetchEvents, ()).await }
    });
    let joined = tokio::spawn({
        let client = gated_client.clone();
        async move { client.query(&FetchEvents, ()).await }
    });
    let older = next_call(&mut calls).await;
    drain_tasks().await;

    let forced = tokio::spawn({
        let client = gated_client.clone();
        async move { client.refetch(&FetchEvents, ()).await }
    });
    let newer = next_call(&mut calls).await;
    newer.respond(Ok(json!([])));
    for handle in [first, joined, forced] {
        handle.await.expect("join").expect("fingerprint");
    }
    older.respond(Ok(json!([])));
    drain_tasks().await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "lexquery_cache_hit_total",
        "lexquery_cache_miss_total",
        "lexquery_inflight_join_total",
        "lexquery_fetch_discarded_total",
        "lexquery_cache_evict_total",
        "lexquery_invalidation_refetch_total",
        "lexquery_cache_entries",
        "lexquery_fetch_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
