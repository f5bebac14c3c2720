//! Invalidation events and the bounded queue they wait in.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::store::StoreHandle;
use crate::domain::types::ResourceId;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

pub(crate) const METRIC_EVENT_QUEUE_LEN: &str = "glossa_invalidation_queue_len";
pub(crate) const METRIC_EVENT_DROPPED: &str = "glossa_invalidation_dropped_total";

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Resources changed in some store; cached text for them is stale everywhere.
    ResourcesChanged { ids: Vec<ResourceId> },
    /// Everything cached for one store is stale.
    StoreChanged { store: StoreHandle },
    /// Candidate properties, languages or cache policy changed.
    ConfigurationChanged,
    /// Services were added to or removed from the service registry.
    ServicesChanged,
    /// Operator-requested flush and rebuild.
    ManualReload,
}

/// FIFO of pending events. When full, the oldest event is dropped.
pub struct EventQueue {
    queue: Mutex<VecDeque<InvalidationEvent>>,
    epoch_counter: AtomicU64,
    limit: usize,
}

impl EventQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
            limit: limit.max(1),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, kind: EventKind) {
        let event = InvalidationEvent::new(kind, self.next_epoch());

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?event.kind,
            "Invalidation event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        if queue.len() >= self.limit
            && let Some(dropped) = queue.pop_front()
        {
            warn!(
                event_id = %dropped.id,
                event_epoch = dropped.epoch,
                limit = self.limit,
                "Invalidation queue full, dropped oldest event"
            );
            counter!(METRIC_EVENT_DROPPED).increment(1);
        }
        queue.push_back(event);
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<InvalidationEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained = queue.drain(..count).collect();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn epochs_increase() {
        let queue = EventQueue::new(8);
        let first = queue.next_epoch();
        let second = queue.next_epoch();
        assert!(first < second);
    }

    #[test]
    fn publish_and_drain_in_order() {
        let queue = EventQueue::new(8);
        queue.publish(EventKind::ServicesChanged);
        queue.publish(EventKind::ConfigurationChanged);
        queue.publish(EventKind::ManualReload);

        let events = queue.drain(2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::ServicesChanged);
        assert_eq!(events[1].kind, EventKind::ConfigurationChanged);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.drain(100).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_drops_the_oldest_event() {
        let queue = EventQueue::new(2);
        queue.publish(EventKind::ServicesChanged);
        queue.publish(EventKind::ConfigurationChanged);
        queue.publish(EventKind::StoreChanged {
            store: StoreHandle::new("main"),
        });

        let kinds: Vec<_> = queue.drain(10).into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ConfigurationChanged,
                EventKind::StoreChanged {
                    store: StoreHandle::new("main")
                },
            ]
        );
    }

    #[test]
    fn clear_empties_the_queue() {
        let queue = EventQueue::new(8);
        queue.publish(EventKind::ManualReload);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn event_queue_recovers_from_poisoned_lock() {
        let queue = EventQueue::new(8);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = queue.queue.lock().expect("queue lock should be acquired");
            panic!("poison queue lock");
        }));

        queue.publish(EventKind::ManualReload);
        assert_eq!(queue.len(), 1);
    }
}
