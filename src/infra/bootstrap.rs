//! Wires settings, the graph store, caches and services into one application.

use std::sync::Arc;

use tracing::info;

use crate::application::discovery::{
    BundledService, DiscoveryResolver, PluggableService, StaticServiceRegistry,
};
use crate::application::literal::LiteralLoader;
use crate::application::lookup::TextLookup;
use crate::application::resolver::CachedResolver;
use crate::application::store::GraphStore;
use crate::application::types::TypeLoader;
use crate::cache::{
    CacheConfig, CacheKey, CacheLoader, CacheRegistry, EventQueue, InvalidationConsumer,
    InvalidationTrigger, PartitionedCache, identity_resource, key_resource,
};
use crate::config::{PeerSettings, Settings};
use crate::domain::types::{ResourceId, TextValue};
use crate::infra::error::InfraError;
use crate::infra::http::LookupState;
use crate::infra::remote::RemoteLoader;

pub const LOCAL_SERVICE: &str = "local";
const DISCOVERY_ID: &str = "discovery";

pub struct Application {
    pub registry: Arc<CacheRegistry>,
    pub services: Arc<StaticServiceRegistry>,
    pub discovery: Arc<DiscoveryResolver>,
    pub lookup: Arc<TextLookup>,
    pub queue: Arc<EventQueue>,
    pub consumer: Arc<InvalidationConsumer>,
    pub trigger: Arc<InvalidationTrigger>,
}

impl Application {
    /// The local store is always the first service; remote peers follow in
    /// configuration order.
    pub fn build(settings: &Settings, graph: Arc<dyn GraphStore>) -> Result<Self, InfraError> {
        let cache_config = settings.cache.clone();
        let registry = Arc::new(CacheRegistry::new());
        let services = Arc::new(StaticServiceRegistry::new());

        services.register(local_service(settings, graph, &registry));
        for peer in &settings.remote.peers {
            services.register(remote_service(peer, &cache_config, &registry)?);
        }

        let discovery = Arc::new(DiscoveryResolver::new(DISCOVERY_ID, services.clone()));
        registry.register_reloadable(&discovery);

        let lookup = Arc::new(TextLookup::new(
            discovery.clone(),
            settings.resolver.languages.clone(),
        ));

        let queue = Arc::new(EventQueue::new(cache_config.event_queue_limit));
        let consumer = Arc::new(InvalidationConsumer::new(
            cache_config.clone(),
            registry.clone(),
            queue.clone(),
        ));
        let trigger = Arc::new(InvalidationTrigger::new(
            cache_config,
            queue.clone(),
            consumer.clone(),
        ));

        info!(
            services = services.len(),
            caches = registry.target_count(),
            languages = %settings.resolver.languages,
            "Application assembled"
        );

        Ok(Self {
            registry,
            services,
            discovery,
            lookup,
            queue,
            consumer,
            trigger,
        })
    }

    /// Adds a service and asks discovery to rebuild its chains.
    pub fn register_service(&self, service: Arc<dyn PluggableService>) {
        self.services.register(service);
        self.trigger.services_changed();
    }

    pub fn unregister_service(&self, name: &str) -> bool {
        let removed = self.services.unregister(name);
        if removed {
            self.trigger.services_changed();
        }
        removed
    }

    pub fn http_state(&self) -> LookupState {
        LookupState {
            lookup: self.lookup.clone(),
            trigger: self.trigger.clone(),
        }
    }
}

fn local_service(
    settings: &Settings,
    graph: Arc<dyn GraphStore>,
    registry: &CacheRegistry,
) -> Arc<dyn PluggableService> {
    let resolver = &settings.resolver;
    let labels = LiteralLoader::new(
        graph.clone(),
        resolver.label_properties.clone(),
        resolver.batch,
    );
    let descriptions = LiteralLoader::new(
        graph.clone(),
        resolver.description_properties.clone(),
        resolver.batch,
    );
    let types = TypeLoader::new(graph, resolver.type_properties.clone(), resolver.batch);

    let label_cache = text_cache(format!("{LOCAL_SERVICE}:label"), &settings.cache, labels);
    let description_cache = text_cache(
        format!("{LOCAL_SERVICE}:description"),
        &settings.cache,
        descriptions,
    );
    let type_cache = Arc::new(
        PartitionedCache::new(
            format!("{LOCAL_SERVICE}:type"),
            &settings.cache,
            Arc::new(types) as Arc<dyn CacheLoader<ResourceId, ResourceId>>,
        )
        .with_key_scope(identity_resource),
    );
    registry.register(&label_cache);
    registry.register(&description_cache);
    registry.register(&type_cache);

    Arc::new(
        BundledService::new(LOCAL_SERVICE)
            .with_labels(Arc::new(CachedResolver::text(
                format!("{LOCAL_SERVICE}:label"),
                label_cache,
            )))
            .with_descriptions(Arc::new(CachedResolver::text(
                format!("{LOCAL_SERVICE}:description"),
                description_cache,
            )))
            .with_types(Arc::new(CachedResolver::types(
                format!("{LOCAL_SERVICE}:type"),
                type_cache,
            ))),
    )
}

fn remote_service(
    peer: &PeerSettings,
    config: &CacheConfig,
    registry: &CacheRegistry,
) -> Result<Arc<dyn PluggableService>, InfraError> {
    let mut service = BundledService::new(peer.name.clone());

    if peer.capabilities.labels {
        let id = format!("{}:label", peer.name);
        let cache = text_cache(id.clone(), config, remote_loader(peer, "api/v1/labels")?);
        registry.register(&cache);
        service = service.with_labels(Arc::new(CachedResolver::text(id, cache)));
    }
    if peer.capabilities.descriptions {
        let id = format!("{}:description", peer.name);
        let cache = text_cache(id.clone(), config, remote_loader(peer, "api/v1/descriptions")?);
        registry.register(&cache);
        service = service.with_descriptions(Arc::new(CachedResolver::text(id, cache)));
    }

    info!(peer = %peer.name, url = %peer.base_url, "Registered remote peer");
    Ok(Arc::new(service))
}

fn remote_loader(peer: &PeerSettings, path: &str) -> Result<RemoteLoader, InfraError> {
    let endpoint = peer.base_url.join(path).map_err(|err| {
        InfraError::configuration(format!("peer `{}` has an unusable URL: {err}", peer.name))
    })?;
    RemoteLoader::new(peer.name.clone(), endpoint, peer.timeout)
        .map_err(|err| InfraError::remote(format!("peer `{}`: {err}", peer.name)))
}

fn text_cache<L>(
    id: String,
    config: &CacheConfig,
    loader: L,
) -> Arc<PartitionedCache<CacheKey, TextValue>>
where
    L: CacheLoader<CacheKey, TextValue> + 'static,
{
    Arc::new(
        PartitionedCache::new(id, config, Arc::new(loader) as Arc<dyn CacheLoader<CacheKey, TextValue>>)
            .with_key_scope(key_resource),
    )
}
