//! Applies invalidation plans to the registered caches.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::planner::InvalidationPlan;
use super::registry::CacheRegistry;

pub(crate) const METRIC_INVALIDATION_CONSUME_MS: &str = "glossa_invalidation_consume_ms";

/// Drains the queue, plans, and fans the plan out through the registry.
pub struct InvalidationConsumer {
    config: CacheConfig,
    registry: Arc<CacheRegistry>,
    queue: Arc<EventQueue>,
}

impl InvalidationConsumer {
    pub fn new(config: CacheConfig, registry: Arc<CacheRegistry>, queue: Arc<EventQueue>) -> Self {
        Self {
            config,
            registry,
            queue,
        }
    }

    /// Consume pending events and apply the plan.
    ///
    /// Returns true if any events were processed.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let started_at = Instant::now();
        let events = self.queue.drain(self.config.consume_batch_limit);
        if events.is_empty() {
            return false;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "Invalidation consumption starting"
        );

        let mut reached = 0;
        if plan.flush_all {
            reached += self.registry.invalidate_all();
        } else {
            for store in &plan.flush_stores {
                reached += self.registry.invalidate_store(store);
            }
            if !plan.invalidate_ids.is_empty() {
                reached += self.registry.invalidate_ids(&plan.invalidate_ids);
            }
        }

        let rebuilt = if plan.rebuild_discovery {
            self.registry.reload_all()
        } else {
            0
        };

        info!(
            event_count,
            targets_reached = reached,
            reloaded = rebuilt,
            "Invalidation consumption complete"
        );

        histogram!(METRIC_INVALIDATION_CONSUME_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        true
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::application::store::StoreHandle;
    use crate::cache::events::EventKind;
    use crate::cache::registry::{InvalidationTarget, Reloadable};
    use crate::domain::types::ResourceId;

    #[derive(Default)]
    struct Probe {
        flushed: AtomicUsize,
        stores: Mutex<Vec<StoreHandle>>,
        ids: Mutex<HashSet<ResourceId>>,
        reloads: AtomicUsize,
    }

    impl InvalidationTarget for Probe {
        fn id(&self) -> &str {
            "probe"
        }

        fn invalidate_all(&self) {
            self.flushed.fetch_add(1, Ordering::SeqCst);
        }

        fn invalidate_ids(&self, ids: &HashSet<ResourceId>) {
            self.ids.lock().expect("ids lock").extend(ids.iter().cloned());
        }

        fn invalidate_store(&self, store: &StoreHandle) {
            self.stores.lock().expect("stores lock").push(store.clone());
        }
    }

    impl Reloadable for Probe {
        fn id(&self) -> &str {
            "probe"
        }

        fn reload(&self) {
            self.reloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn create_consumer(config: CacheConfig) -> (InvalidationConsumer, Arc<Probe>) {
        let registry = Arc::new(CacheRegistry::new());
        let probe = Arc::new(Probe::default());
        registry.register(&probe);
        registry.register_reloadable(&probe);
        let queue = Arc::new(EventQueue::new(config.event_queue_limit));
        (InvalidationConsumer::new(config, registry, queue), probe)
    }

    #[test]
    fn consume_empty_queue_returns_false() {
        let (consumer, _) = create_consumer(CacheConfig::default());
        assert!(!consumer.consume());
    }

    #[test]
    fn resource_changes_reach_scoped_invalidation() {
        let (consumer, probe) = create_consumer(CacheConfig::default());
        consumer.queue().publish(EventKind::ResourcesChanged {
            ids: vec![ResourceId::from("urn:a")],
        });
        consumer.queue().publish(EventKind::StoreChanged {
            store: StoreHandle::new("main"),
        });

        assert!(consumer.consume());
        assert!(probe.ids.lock().expect("ids lock").contains(&ResourceId::from("urn:a")));
        assert_eq!(
            *probe.stores.lock().expect("stores lock"),
            vec![StoreHandle::new("main")]
        );
        assert_eq!(probe.flushed.load(Ordering::SeqCst), 0);
        assert_eq!(probe.reloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn manual_reload_flushes_and_rebuilds() {
        let (consumer, probe) = create_consumer(CacheConfig::default());
        consumer.queue().publish(EventKind::ManualReload);

        assert!(consumer.consume());
        assert_eq!(probe.flushed.load(Ordering::SeqCst), 1);
        assert_eq!(probe.reloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn consume_respects_batch_limit() {
        let (consumer, _) = create_consumer(CacheConfig {
            consume_batch_limit: 2,
            ..Default::default()
        });
        for _ in 0..5 {
            consumer.queue().publish(EventKind::ServicesChanged);
        }

        consumer.consume();
        assert_eq!(consumer.queue().len(), 3);
    }
}
