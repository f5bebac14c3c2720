use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use glossa::application::lookup::TextKind;
use glossa::application::store::StoreHandle;
use glossa::cache::{CacheKey, EventKind, EventQueue};
use glossa::config::Settings;
use glossa::domain::types::{PreferredLanguages, ResourceId, Term, TextValue};
use glossa::infra::bootstrap::Application;
use glossa::infra::memory::MemoryStore;
use glossa::infra::remote::RemoteLoader;
use metrics_util::debugging::DebuggingRecorder;
use url::Url;

const LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

#[tokio::test]
async fn resolution_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Cache hit/miss/evict plus batch timings
    let graph = Arc::new(MemoryStore::new());
    let museum = StoreHandle::new("museum");
    for id in ["urn:a", "urn:b", "urn:c"] {
        graph.insert(&museum, id, LABEL, Term::Literal(TextValue::new(id, "en")));
    }
    let mut settings = Settings::default();
    settings.cache.per_store_limit = 1;
    settings.resolver.batch.batch_size = 1;
    let app = Application::build(&settings, graph).expect("application");

    let ids: HashSet<ResourceId> = ["urn:a", "urn:b"].into_iter().map(ResourceId::from).collect();
    for _ in 0..2 {
        app.lookup
            .resolve(&museum, &ids, None, TextKind::Label)
            .await
            .expect("labels");
    }
    app.lookup
        .resolve_one(&museum, &ResourceId::from("urn:c"), None, TextKind::Label)
        .await
        .expect("label");
    app.lookup
        .resolve_one(&museum, &ResourceId::from("urn:c"), None, TextKind::Label)
        .await
        .expect("label");

    // Event queue length + drop metrics, consumer latency
    let queue = EventQueue::new(1);
    queue.publish(EventKind::ManualReload);
    queue.publish(EventKind::ConfigurationChanged);
    let _ = queue.drain(1);
    app.trigger.store_changed(&museum);

    // Failed remote call
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let endpoint = Url::parse(&format!("http://{addr}/api/v1/labels")).expect("url");
    let loader = RemoteLoader::new("gone", endpoint, Duration::from_secs(2)).expect("client");
    let keys = HashSet::from([CacheKey::new(
        ResourceId::from("urn:a"),
        PreferredLanguages::single("en"),
    )]);
    loader.resolve(&museum, &keys).await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "glossa_cache_hit_total",
        "glossa_cache_miss_total",
        "glossa_cache_evict_total",
        "glossa_batch_query_ms",
        "glossa_batch_total",
        "glossa_invalidation_queue_len",
        "glossa_invalidation_dropped_total",
        "glossa_invalidation_consume_ms",
        "glossa_remote_call_failed_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
