//! Keyed cache with one independent LRU partition per store.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::application::error::ResolveError;
use crate::application::store::StoreHandle;
use crate::domain::types::{ResourceId, Resolution};

use super::config::CacheConfig;
use super::lock::{mutex_lock, rw_read, rw_write};
use super::registry::InvalidationTarget;

const SOURCE: &str = "cache::partitioned";

pub(crate) const METRIC_CACHE_HIT: &str = "glossa_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "glossa_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "glossa_cache_evict_total";

/// Outcome of a single-key load that produced no value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The store confirmed there is nothing to show; cached as negative.
    #[error("no value found")]
    NotFound,
    #[error("loader failed: {0}")]
    Failed(String),
}

impl LoadError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Produces values for cache misses.
#[async_trait]
pub trait CacheLoader<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    async fn load(&self, store: &StoreHandle, key: &K) -> Result<V, LoadError>;

    /// Loads many keys at once. Every key must appear in the result.
    ///
    /// The default loads one key at a time and never fails.
    async fn load_all(
        &self,
        store: &StoreHandle,
        keys: &[K],
    ) -> Result<HashMap<K, Resolution<V>>, ResolveError> {
        let mut resolved = HashMap::with_capacity(keys.len());
        for key in keys {
            let resolution = match self.load(store, key).await {
                Ok(value) => Resolution::Found(value),
                Err(LoadError::NotFound) => Resolution::NotFound,
                Err(LoadError::Failed(message)) => {
                    warn!(store = %store, error = %message, "Cache loader failed for key");
                    Resolution::NotFound
                }
            };
            resolved.insert(key.clone(), resolution);
        }
        Ok(resolved)
    }
}

/// Maps a key to the resource it describes, enabling scoped invalidation.
pub type KeyScope<K> = fn(&K) -> &ResourceId;

struct Entry<V> {
    /// `None` is a cached negative result.
    value: Option<V>,
    stored_at: Instant,
}

struct Partition<K: Hash + Eq, V> {
    entries: RwLock<LruCache<K, Entry<V>>>,
}

/// Cache partitioned by store; partitions are created on first use.
pub struct PartitionedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    id: String,
    config: CacheConfig,
    loader: Arc<dyn CacheLoader<K, V>>,
    partitions: Mutex<HashMap<StoreHandle, Arc<Partition<K, V>>>>,
    scope: Option<KeyScope<K>>,
}

impl<K, V> PartitionedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        id: impl Into<String>,
        config: &CacheConfig,
        loader: Arc<dyn CacheLoader<K, V>>,
    ) -> Self {
        Self {
            id: id.into(),
            config: config.clone(),
            loader,
            partitions: Mutex::new(HashMap::new()),
            scope: None,
        }
    }

    /// Enables [`InvalidationTarget::invalidate_ids`] for this cache.
    pub fn with_key_scope(mut self, scope: KeyScope<K>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cached resolution without loading. Expired entries read as unknown.
    pub fn peek(&self, store: &StoreHandle, key: &K) -> Resolution<V> {
        let Some(partition) = self.existing_partition(store) else {
            return Resolution::Unknown;
        };
        let entries = rw_read(&partition.entries, SOURCE, "peek");
        match entries.peek(key) {
            Some(entry) if !self.is_expired(entry) => Resolution::from_lookup(entry.value.clone()),
            _ => Resolution::Unknown,
        }
    }

    /// Cached entries among `keys`; keys not in the cache are left out.
    pub fn peek_all(&self, store: &StoreHandle, keys: &[K]) -> HashMap<K, Option<V>> {
        let Some(partition) = self.existing_partition(store) else {
            return HashMap::new();
        };
        let entries = rw_read(&partition.entries, SOURCE, "peek_all");
        keys.iter()
            .filter_map(|key| match entries.peek(key) {
                Some(entry) if !self.is_expired(entry) => Some((key.clone(), entry.value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Cached value, loading and caching it on a miss.
    ///
    /// A loader "not found" is cached as a negative entry. Any other loader
    /// failure is logged and reported as no value without being cached.
    pub async fn get_or_load(&self, store: &StoreHandle, key: &K) -> Option<V> {
        let partition = self.partition(store);
        if let Some(cached) = self.lookup(&partition, key) {
            return cached;
        }

        match self.loader.load(store, key).await {
            Ok(value) => {
                self.insert(&partition, key.clone(), Some(value.clone()));
                Some(value)
            }
            Err(LoadError::NotFound) => {
                trace!(cache = %self.id, store = %store, "Loader found no value; caching negative entry");
                self.insert(&partition, key.clone(), None);
                None
            }
            Err(LoadError::Failed(message)) => {
                warn!(
                    cache = %self.id,
                    store = %store,
                    error = %message,
                    "Cache loader failed; treating as not found"
                );
                None
            }
        }
    }

    /// Bulk variant of [`Self::get_or_load`]: all misses go to the loader in
    /// one call. Loader errors propagate.
    ///
    /// The result holds one entry per distinct key, never `Unknown`.
    pub async fn get_all_or_load(
        &self,
        store: &StoreHandle,
        keys: &[K],
    ) -> Result<HashMap<K, Resolution<V>>, ResolveError> {
        let partition = self.partition(store);
        let mut resolved = HashMap::with_capacity(keys.len());
        let mut misses = Vec::new();
        let mut pending = HashSet::new();

        for key in keys {
            if resolved.contains_key(key) || pending.contains(key) {
                continue;
            }
            match self.lookup(&partition, key) {
                Some(cached) => {
                    resolved.insert(key.clone(), Resolution::from_lookup(cached));
                }
                None => {
                    pending.insert(key.clone());
                    misses.push(key.clone());
                }
            }
        }

        if misses.is_empty() {
            return Ok(resolved);
        }

        debug!(
            cache = %self.id,
            store = %store,
            hits = resolved.len(),
            misses = misses.len(),
            "Loading cache misses"
        );
        let mut loaded = self.loader.load_all(store, &misses).await?;

        for key in misses {
            let value = match loaded.remove(&key) {
                Some(Resolution::Found(value)) => Some(value),
                _ => None,
            };
            self.insert(&partition, key.clone(), value.clone());
            resolved.insert(key, Resolution::from_lookup(value));
        }

        Ok(resolved)
    }

    /// Number of live partitions.
    pub fn partition_count(&self) -> usize {
        mutex_lock(&self.partitions, SOURCE, "partition_count").len()
    }

    /// Entries cached for one store, including negative ones.
    pub fn len(&self, store: &StoreHandle) -> usize {
        self.existing_partition(store)
            .map(|partition| rw_read(&partition.entries, SOURCE, "len").len())
            .unwrap_or(0)
    }

    fn existing_partition(&self, store: &StoreHandle) -> Option<Arc<Partition<K, V>>> {
        mutex_lock(&self.partitions, SOURCE, "existing_partition")
            .get(store)
            .cloned()
    }

    fn partition(&self, store: &StoreHandle) -> Arc<Partition<K, V>> {
        let mut partitions = mutex_lock(&self.partitions, SOURCE, "partition");
        partitions
            .entry(store.clone())
            .or_insert_with(|| {
                debug!(cache = %self.id, store = %store, "Created cache partition");
                Arc::new(Partition {
                    entries: RwLock::new(LruCache::new(self.config.per_store_limit_non_zero())),
                })
            })
            .clone()
    }

    /// `Some(cached)` on a fresh hit, `None` on a miss.
    ///
    /// A disabled cache always misses and stores nothing.
    fn lookup(&self, partition: &Partition<K, V>, key: &K) -> Option<Option<V>> {
        if !self.config.is_enabled() {
            return None;
        }
        let mut entries = rw_write(&partition.entries, SOURCE, "lookup");
        let state = entries
            .get(key)
            .map(|entry| (!self.is_expired(entry)).then(|| entry.value.clone()));
        let hit = match state {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                None
            }
            None => None,
        };
        drop(entries);

        let metric = if hit.is_some() {
            METRIC_CACHE_HIT
        } else {
            METRIC_CACHE_MISS
        };
        counter!(metric, "cache" => self.id.clone()).increment(1);
        hit
    }

    fn insert(&self, partition: &Partition<K, V>, key: K, value: Option<V>) {
        if !self.config.is_enabled() {
            return;
        }
        let entry = Entry {
            value,
            stored_at: Instant::now(),
        };
        let evicted = rw_write(&partition.entries, SOURCE, "insert").push(key.clone(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_CACHE_EVICT, "cache" => self.id.clone()).increment(1);
        }
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        self.ttl()
            .is_some_and(|ttl| entry.stored_at.elapsed() >= ttl)
    }

    fn ttl(&self) -> Option<Duration> {
        self.config.ttl()
    }
}

impl<K, V> InvalidationTarget for PartitionedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    /// Drops every partition; they are recreated on next access.
    fn invalidate_all(&self) {
        let dropped = std::mem::take(&mut *mutex_lock(
            &self.partitions,
            SOURCE,
            "invalidate_all",
        ));
        debug!(cache = %self.id, partitions = dropped.len(), "Dropped all cache partitions");
    }

    fn invalidate_ids(&self, ids: &HashSet<ResourceId>) {
        let Some(scope) = self.scope else {
            return;
        };
        let partitions: Vec<_> = mutex_lock(&self.partitions, SOURCE, "invalidate_ids")
            .values()
            .cloned()
            .collect();

        let mut removed = 0usize;
        for partition in partitions {
            let mut entries = rw_write(&partition.entries, SOURCE, "invalidate_ids");
            let stale: Vec<K> = entries
                .iter()
                .filter(|(key, _)| ids.contains(scope(key)))
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                entries.pop(&key);
                removed += 1;
            }
        }
        debug!(cache = %self.id, ids = ids.len(), removed, "Invalidated cached resources");
    }

    fn invalidate_store(&self, store: &StoreHandle) {
        let dropped = mutex_lock(&self.partitions, SOURCE, "invalidate_store").remove(store);
        debug!(
            cache = %self.id,
            store = %store,
            dropped = dropped.is_some(),
            "Dropped cache partition"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::keys::identity_resource;

    /// Loader over a fixed table; `urn:broken` fails.
    struct TableLoader {
        values: HashMap<ResourceId, String>,
        loads: AtomicUsize,
    }

    impl TableLoader {
        fn new(values: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                values: values
                    .iter()
                    .map(|(k, v)| (ResourceId::from(*k), v.to_string()))
                    .collect(),
                loads: AtomicUsize::new(0),
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CacheLoader<ResourceId, String> for TableLoader {
        async fn load(&self, _store: &StoreHandle, key: &ResourceId) -> Result<String, LoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if key.as_str() == "urn:broken" {
                return Err(LoadError::failed("backend unavailable"));
            }
            self.values.get(key).cloned().ok_or(LoadError::NotFound)
        }
    }

    fn cache(loader: Arc<TableLoader>, config: CacheConfig) -> PartitionedCache<ResourceId, String> {
        PartitionedCache::new("test", &config, loader).with_key_scope(identity_resource)
    }

    fn store(name: &str) -> StoreHandle {
        StoreHandle::new(name)
    }

    #[tokio::test]
    async fn negative_results_are_cached() {
        let loader = TableLoader::new(&[("urn:a", "A")]);
        let cache = cache(loader.clone(), CacheConfig::default());
        let missing = ResourceId::from("urn:missing");

        assert_eq!(cache.peek(&store("s"), &missing), Resolution::Unknown);
        assert_eq!(cache.get_or_load(&store("s"), &missing).await, None);
        assert_eq!(cache.peek(&store("s"), &missing), Resolution::NotFound);
        assert_eq!(cache.get_or_load(&store("s"), &missing).await, None);
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn loader_failures_are_not_cached() {
        let loader = TableLoader::new(&[]);
        let cache = cache(loader.clone(), CacheConfig::default());
        let broken = ResourceId::from("urn:broken");

        assert_eq!(cache.get_or_load(&store("s"), &broken).await, None);
        assert_eq!(cache.peek(&store("s"), &broken), Resolution::Unknown);
        cache.get_or_load(&store("s"), &broken).await;
        assert_eq!(loader.loads(), 2);
    }

    #[tokio::test]
    async fn partitions_are_independent_per_store() {
        let loader = TableLoader::new(&[("urn:a", "A")]);
        let cache = cache(loader.clone(), CacheConfig::default());
        let key = ResourceId::from("urn:a");

        cache.get_or_load(&store("one"), &key).await;
        assert_eq!(cache.peek(&store("two"), &key), Resolution::Unknown);
        cache.get_or_load(&store("two"), &key).await;

        assert_eq!(cache.partition_count(), 2);
        assert_eq!(loader.loads(), 2);

        cache.invalidate_store(&store("one"));
        assert_eq!(cache.partition_count(), 1);
        assert_eq!(cache.peek(&store("two"), &key), Resolution::Found("A".to_string()));
    }

    #[tokio::test]
    async fn bulk_load_fills_every_key_and_peek_all_only_returns_cached() {
        let loader = TableLoader::new(&[("urn:a", "A"), ("urn:b", "B")]);
        let cache = cache(loader.clone(), CacheConfig::default());
        let keys = vec![
            ResourceId::from("urn:a"),
            ResourceId::from("urn:b"),
            ResourceId::from("urn:c"),
            ResourceId::from("urn:a"),
        ];

        let resolved = cache
            .get_all_or_load(&store("s"), &keys)
            .await
            .expect("default bulk load never fails");
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[&keys[2]], Resolution::NotFound);
        assert_eq!(loader.loads(), 3);

        let peeked = cache.peek_all(&store("s"), &[keys[0].clone(), ResourceId::from("urn:z")]);
        assert_eq!(peeked.len(), 1);
        assert_eq!(peeked[&keys[0]], Some("A".to_string()));

        cache
            .get_all_or_load(&store("s"), &keys)
            .await
            .expect("cached");
        assert_eq!(loader.loads(), 3);
    }

    #[tokio::test]
    async fn scoped_invalidation_drops_only_listed_resources() {
        let loader = TableLoader::new(&[("urn:a", "A"), ("urn:b", "B")]);
        let cache = cache(loader, CacheConfig::default());
        let a = ResourceId::from("urn:a");
        let b = ResourceId::from("urn:b");
        cache.get_or_load(&store("s"), &a).await;
        cache.get_or_load(&store("s"), &b).await;

        cache.invalidate_ids(&[a.clone()].into_iter().collect());

        assert_eq!(cache.peek(&store("s"), &a), Resolution::Unknown);
        assert!(cache.peek(&store("s"), &b).is_found());
    }

    #[tokio::test]
    async fn caches_without_scope_ignore_id_invalidation() {
        let loader = TableLoader::new(&[("urn:a", "A")]);
        let cache: PartitionedCache<ResourceId, String> =
            PartitionedCache::new("plain", &CacheConfig::default(), loader);
        let a = ResourceId::from("urn:a");
        cache.get_or_load(&store("s"), &a).await;

        cache.invalidate_ids(&[a.clone()].into_iter().collect());
        assert!(cache.peek(&store("s"), &a).is_found());

        cache.invalidate_all();
        assert_eq!(cache.partition_count(), 0);
        assert_eq!(cache.peek(&store("s"), &a), Resolution::Unknown);
    }

    #[tokio::test]
    async fn capacity_is_enforced_per_partition() {
        let loader = TableLoader::new(&[("urn:a", "A"), ("urn:b", "B"), ("urn:c", "C")]);
        let cache = cache(
            loader,
            CacheConfig {
                per_store_limit: 2,
                ..Default::default()
            },
        );
        for id in ["urn:a", "urn:b", "urn:c"] {
            cache.get_or_load(&store("s"), &ResourceId::from(id)).await;
        }

        assert_eq!(cache.len(&store("s")), 2);
        assert_eq!(
            cache.peek(&store("s"), &ResourceId::from("urn:a")),
            Resolution::Unknown
        );
    }

    #[tokio::test]
    async fn disabled_cache_always_goes_to_the_loader() {
        let loader = TableLoader::new(&[("urn:a", "A")]);
        let cache = cache(
            loader.clone(),
            CacheConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let main = store("main");
        let keys = [ResourceId::from("urn:a"), ResourceId::from("urn:missing")];

        for _ in 0..2 {
            assert_eq!(
                cache.get_or_load(&main, &keys[0]).await,
                Some("A".to_string())
            );
            let bulk = cache.get_all_or_load(&main, &keys).await.expect("bulk load");
            assert_eq!(bulk[&keys[1]], Resolution::NotFound);
        }

        assert_eq!(loader.loads(), 6);
        assert_eq!(cache.len(&main), 0);
        assert_eq!(cache.peek(&main, &keys[0]), Resolution::Unknown);
    }

    #[test]
    fn partition_lock_recovers_from_poisoning() {
        let loader = TableLoader::new(&[]);
        let cache = cache(loader, CacheConfig::default());

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache.partitions.lock().expect("partitions lock");
            panic!("poison partitions");
        }));

        assert_eq!(cache.partition_count(), 0);
    }
}
