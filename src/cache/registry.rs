//! Central registry of invalidation targets.
//!
//! Caches and lazily built resolver chains register here; the invalidation
//! consumer fans every planned action out through the registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use crate::application::store::StoreHandle;
use crate::domain::types::ResourceId;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

/// A cache that can be flushed by the central invalidation signal.
pub trait InvalidationTarget: Send + Sync {
    fn id(&self) -> &str;

    fn invalidate_all(&self);

    /// Drops entries of the given resources. No-op unless overridden.
    fn invalidate_ids(&self, _ids: &HashSet<ResourceId>) {}

    /// Drops entries of one store.
    fn invalidate_store(&self, _store: &StoreHandle) {
        self.invalidate_all();
    }
}

/// Lazily built state that must be rebuilt when services change.
pub trait Reloadable: Send + Sync {
    fn id(&self) -> &str;

    fn reload(&self);
}

/// Holds weak references; dropped targets are pruned on the next fan-out.
pub struct CacheRegistry {
    targets: RwLock<HashMap<String, Weak<dyn InvalidationTarget>>>,
    reloadables: RwLock<HashMap<String, Weak<dyn Reloadable>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            reloadables: RwLock::new(HashMap::new()),
        }
    }

    /// Register a cache; a later registration with the same id replaces it.
    pub fn register<T>(&self, target: &Arc<T>)
    where
        T: InvalidationTarget + 'static,
    {
        let target: Arc<dyn InvalidationTarget> = target.clone();
        let id = target.id().to_string();
        debug!(target_id = %id, "Registered invalidation target");
        rw_write(&self.targets, SOURCE, "register").insert(id, Arc::downgrade(&target));
    }

    pub fn register_reloadable<T>(&self, target: &Arc<T>)
    where
        T: Reloadable + 'static,
    {
        let target: Arc<dyn Reloadable> = target.clone();
        let id = target.id().to_string();
        debug!(target_id = %id, "Registered reloadable target");
        rw_write(&self.reloadables, SOURCE, "register_reloadable")
            .insert(id, Arc::downgrade(&target));
    }

    pub fn unregister(&self, id: &str) {
        rw_write(&self.targets, SOURCE, "unregister").remove(id);
        rw_write(&self.reloadables, SOURCE, "unregister").remove(id);
    }

    /// Flush every registered cache. Returns the number of caches reached.
    pub fn invalidate_all(&self) -> usize {
        self.each_target("invalidate_all", |target| target.invalidate_all())
    }

    pub fn invalidate_ids(&self, ids: &HashSet<ResourceId>) -> usize {
        self.each_target("invalidate_ids", |target| target.invalidate_ids(ids))
    }

    pub fn invalidate_store(&self, store: &StoreHandle) -> usize {
        self.each_target("invalidate_store", |target| target.invalidate_store(store))
    }

    /// Rebuild every registered reloadable. Returns the number reached.
    pub fn reload_all(&self) -> usize {
        let live = live_entries(&self.reloadables, "reload_all");
        for reloadable in &live {
            reloadable.reload();
        }
        live.len()
    }

    pub fn target_count(&self) -> usize {
        rw_read(&self.targets, SOURCE, "target_count").len()
    }

    pub fn reloadable_count(&self) -> usize {
        rw_read(&self.reloadables, SOURCE, "reloadable_count").len()
    }

    fn each_target(&self, op: &'static str, apply: impl Fn(&dyn InvalidationTarget)) -> usize {
        let live = live_entries(&self.targets, op);
        for target in &live {
            apply(target.as_ref());
        }
        live.len()
    }
}

/// Upgrades live entries and prunes dead ones. Callbacks run outside the lock.
fn live_entries<T: ?Sized>(
    entries: &RwLock<HashMap<String, Weak<T>>>,
    op: &'static str,
) -> Vec<Arc<T>> {
    let mut entries = rw_write(entries, SOURCE, op);
    entries.retain(|_, weak| weak.strong_count() > 0);
    entries.values().filter_map(Weak::upgrade).collect()
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
