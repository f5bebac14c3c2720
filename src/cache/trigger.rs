//! Publishes invalidation events and optionally applies them at once.

use std::sync::Arc;

use tracing::debug;

use crate::application::store::StoreHandle;
use crate::domain::types::ResourceId;

use super::config::CacheConfig;
use super::consumer::InvalidationConsumer;
use super::events::{EventKind, EventQueue};

/// Entry point for code that knows something changed.
///
/// ```ignore
/// // After a bulk import into the "main" repository:
/// trigger.store_changed(&StoreHandle::new("main"));
/// ```
pub struct InvalidationTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    consumer: Arc<InvalidationConsumer>,
}

impl InvalidationTrigger {
    pub fn new(
        config: CacheConfig,
        queue: Arc<EventQueue>,
        consumer: Arc<InvalidationConsumer>,
    ) -> Self {
        Self {
            config,
            queue,
            consumer,
        }
    }

    /// Publish an event and, if `consume_now`, apply the queue immediately.
    ///
    /// Otherwise the background tick picks it up.
    /// Events flow even when caching is disabled so service changes still
    /// rebuild discovery.
    pub fn trigger(&self, kind: EventKind, consume_now: bool) {
        debug!(event_kind = ?kind, consume_now, "Invalidation triggered");
        self.queue.publish(kind);

        if consume_now {
            self.consumer.consume();
        }
    }

    pub fn resources_changed(&self, ids: impl IntoIterator<Item = ResourceId>) {
        self.trigger(
            EventKind::ResourcesChanged {
                ids: ids.into_iter().collect(),
            },
            true,
        );
    }

    pub fn store_changed(&self, store: &StoreHandle) {
        self.trigger(
            EventKind::StoreChanged {
                store: store.clone(),
            },
            true,
        );
    }

    pub fn configuration_changed(&self) {
        self.trigger(EventKind::ConfigurationChanged, true);
    }

    pub fn services_changed(&self) {
        self.trigger(EventKind::ServicesChanged, true);
    }

    pub fn manual_reload(&self) {
        self.trigger(EventKind::ManualReload, true);
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn consumer(&self) -> &Arc<InvalidationConsumer> {
        &self.consumer
    }
}
