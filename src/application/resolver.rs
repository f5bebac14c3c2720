//! Capability contract shared by every resolver and its basic implementations.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::error::ResolveError;
use crate::application::store::StoreHandle;
use crate::cache::{CacheKey, KeyScope, PartitionedCache, identity_resource, key_resource};
use crate::domain::types::{PreferredLanguages, ResourceId, Resolution, TextValue};

/// Resolves one capability (labels, descriptions or types) for resources of
/// a store.
#[async_trait]
pub trait Resolver<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str;

    async fn resolve_one(
        &self,
        store: &StoreHandle,
        id: &ResourceId,
        languages: &PreferredLanguages,
    ) -> Result<Option<V>, ResolveError> {
        let ids = HashSet::from([id.clone()]);
        let mut resolved = self.resolve_many(store, &ids, languages).await?;
        Ok(resolved.remove(id).and_then(Resolution::into_value))
    }

    /// Resolutions for `ids`. Ids missing from the result, or answered with
    /// `Unknown`, were not looked at by this resolver.
    async fn resolve_many(
        &self,
        store: &StoreHandle,
        ids: &HashSet<ResourceId>,
        languages: &PreferredLanguages,
    ) -> Result<HashMap<ResourceId, Resolution<V>>, ResolveError>;
}

/// Resolver for a capability nobody provides: everything is not found.
pub struct NoopResolver<V> {
    name: String,
    _value: PhantomData<fn() -> V>,
}

impl<V> NoopResolver<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _value: PhantomData,
        }
    }
}

#[async_trait]
impl<V> Resolver<V> for NoopResolver<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_one(
        &self,
        _store: &StoreHandle,
        _id: &ResourceId,
        _languages: &PreferredLanguages,
    ) -> Result<Option<V>, ResolveError> {
        Ok(None)
    }

    async fn resolve_many(
        &self,
        _store: &StoreHandle,
        ids: &HashSet<ResourceId>,
        _languages: &PreferredLanguages,
    ) -> Result<HashMap<ResourceId, Resolution<V>>, ResolveError> {
        Ok(ids
            .iter()
            .map(|id| (id.clone(), Resolution::NotFound))
            .collect())
    }
}

type KeyBuilder<K> = fn(&ResourceId, &PreferredLanguages) -> K;

/// Resolver answering from a [`PartitionedCache`].
pub struct CachedResolver<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    name: String,
    cache: Arc<PartitionedCache<K, V>>,
    key_for: KeyBuilder<K>,
    resource_of: KeyScope<K>,
}

fn text_key(id: &ResourceId, languages: &PreferredLanguages) -> CacheKey {
    CacheKey::new(id.clone(), languages.clone())
}

fn type_key(id: &ResourceId, _languages: &PreferredLanguages) -> ResourceId {
    id.clone()
}

impl CachedResolver<CacheKey, TextValue> {
    /// Language-dependent text, keyed by resource and effective language.
    pub fn text(name: impl Into<String>, cache: Arc<PartitionedCache<CacheKey, TextValue>>) -> Self {
        Self {
            name: name.into(),
            cache,
            key_for: text_key,
            resource_of: key_resource,
        }
    }
}

impl CachedResolver<ResourceId, ResourceId> {
    /// Language-independent types, keyed by resource.
    pub fn types(name: impl Into<String>, cache: Arc<PartitionedCache<ResourceId, ResourceId>>) -> Self {
        Self {
            name: name.into(),
            cache,
            key_for: type_key,
            resource_of: identity_resource,
        }
    }
}

impl<K, V> CachedResolver<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn cache(&self) -> &Arc<PartitionedCache<K, V>> {
        &self.cache
    }
}

#[async_trait]
impl<K, V> Resolver<V> for CachedResolver<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_one(
        &self,
        store: &StoreHandle,
        id: &ResourceId,
        languages: &PreferredLanguages,
    ) -> Result<Option<V>, ResolveError> {
        let key = (self.key_for)(id, languages);
        let mut resolved = self
            .cache
            .get_all_or_load(store, std::slice::from_ref(&key))
            .await?;
        Ok(resolved.remove(&key).and_then(Resolution::into_value))
    }

    async fn resolve_many(
        &self,
        store: &StoreHandle,
        ids: &HashSet<ResourceId>,
        languages: &PreferredLanguages,
    ) -> Result<HashMap<ResourceId, Resolution<V>>, ResolveError> {
        let keys: Vec<K> = ids.iter().map(|id| (self.key_for)(id, languages)).collect();
        let resolved = self.cache.get_all_or_load(store, &keys).await?;
        Ok(resolved
            .into_iter()
            .map(|(key, resolution)| ((self.resource_of)(&key).clone(), resolution))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_resolver_reports_every_id_as_not_found() {
        let resolver = NoopResolver::<TextValue>::new("noop");
        let ids = HashSet::from([ResourceId::from("urn:a"), ResourceId::from("urn:b")]);
        let languages = PreferredLanguages::single("en");

        let resolved = resolver
            .resolve_many(&StoreHandle::new("s"), &ids, &languages)
            .await
            .expect("noop never fails");

        assert_eq!(resolved.len(), 2);
        assert!(resolved.values().all(|r| *r == Resolution::NotFound));
        assert_eq!(
            resolver
                .resolve_one(&StoreHandle::new("s"), &ResourceId::from("urn:a"), &languages)
                .await
                .expect("noop never fails"),
            None
        );
    }
}
