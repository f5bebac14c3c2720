//! Merges pending invalidation events into one plan.

use std::collections::HashSet;
use std::fmt;

use crate::application::store::StoreHandle;
use crate::domain::types::ResourceId;

use super::events::{Epoch, EventKind, InvalidationEvent};

#[derive(Debug, Default)]
pub struct InvalidationPlan {
    /// Drop every cached entry of every store.
    pub flush_all: bool,
    /// Stores whose partitions are dropped.
    pub flush_stores: HashSet<StoreHandle>,
    /// Resources dropped from every partition.
    pub invalidate_ids: HashSet<ResourceId>,
    /// Rebuild lazily discovered resolver chains.
    pub rebuild_discovery: bool,
    /// Highest epoch merged into this plan.
    pub latest_epoch: Option<Epoch>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ flush_all: {}, stores: {}, ids: {}, rebuild: {} }}",
            self.flush_all,
            self.flush_stores.len(),
            self.invalidate_ids.len(),
            self.rebuild_discovery,
        )
    }
}

impl InvalidationPlan {
    /// Deduplicates by event id and folds events into the cheapest set of
    /// actions. A full flush subsumes store and id invalidation.
    pub fn from_events(events: Vec<InvalidationEvent>) -> Self {
        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();

        for event in events.into_iter().filter(|e| seen_ids.insert(e.id)) {
            plan.latest_epoch = plan.latest_epoch.max(Some(event.epoch));
            match event.kind {
                EventKind::ResourcesChanged { ids } => plan.invalidate_ids.extend(ids),
                EventKind::StoreChanged { store } => {
                    plan.flush_stores.insert(store);
                }
                EventKind::ConfigurationChanged | EventKind::ManualReload => {
                    plan.flush_all = true;
                    plan.rebuild_discovery = true;
                }
                EventKind::ServicesChanged => plan.rebuild_discovery = true,
            }
        }

        if plan.flush_all {
            plan.flush_stores.clear();
            plan.invalidate_ids.clear();
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        !self.flush_all
            && self.flush_stores.is_empty()
            && self.invalidate_ids.is_empty()
            && !self.rebuild_discovery
    }
}
