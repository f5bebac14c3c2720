//! Resolver chains assembled from whichever services are currently registered.
//!
//! Services announce what they can resolve through a [`ServiceDescriptor`].
//! [`DiscoveryResolver`] scans the [`ServiceRegistry`] on first use and keeps
//! one chain per capability until it is told to reload.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::chain::DelegatingResolver;
use crate::application::resolver::{NoopResolver, Resolver};
use crate::cache::{Reloadable, mutex_lock, rw_read, rw_write};
use crate::domain::types::{ResourceId, TextValue};

const SOURCE: &str = "application::discovery";

pub type TextResolver = Arc<dyn Resolver<TextValue>>;
pub type TypeResolver = Arc<dyn Resolver<ResourceId>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Label,
    Description,
    Type,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Description => "description",
            Self::Type => "type",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub labels: bool,
    pub descriptions: bool,
    pub types: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            labels: true,
            descriptions: true,
            types: true,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Label => self.labels,
            Capability::Description => self.descriptions,
            Capability::Type => self.types,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub capabilities: Capabilities,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{capability} resolution is not provided")]
    Unsupported { capability: Capability },
    #[error("service `{service}` failed to build its {capability} resolver: {message}")]
    Build {
        service: String,
        capability: Capability,
        message: String,
    },
    #[error("service registry unavailable: {0}")]
    Registry(String),
}

impl DiscoveryError {
    pub fn unsupported(capability: Capability) -> Self {
        Self::Unsupported { capability }
    }

    pub fn build(
        service: impl Into<String>,
        capability: Capability,
        message: impl Into<String>,
    ) -> Self {
        Self::Build {
            service: service.into(),
            capability,
            message: message.into(),
        }
    }
}

/// A backing service that may contribute resolvers.
pub trait PluggableService: Send + Sync {
    fn descriptor(&self) -> Result<ServiceDescriptor, DiscoveryError>;

    fn label_resolver(&self) -> Result<TextResolver, DiscoveryError> {
        Err(DiscoveryError::unsupported(Capability::Label))
    }

    fn description_resolver(&self) -> Result<TextResolver, DiscoveryError> {
        Err(DiscoveryError::unsupported(Capability::Description))
    }

    fn type_resolver(&self) -> Result<TypeResolver, DiscoveryError> {
        Err(DiscoveryError::unsupported(Capability::Type))
    }
}

/// Source of the currently available services, in delegation order.
pub trait ServiceRegistry: Send + Sync {
    fn services(&self) -> Result<Vec<Arc<dyn PluggableService>>, DiscoveryError>;
}

/// Registry backed by an in-process list.
#[derive(Default)]
pub struct StaticServiceRegistry {
    services: RwLock<Vec<Arc<dyn PluggableService>>>,
}

impl StaticServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service: Arc<dyn PluggableService>) {
        rw_write(&self.services, SOURCE, "register").push(service);
    }

    /// Removes every service whose descriptor carries `name`.
    pub fn unregister(&self, name: &str) -> bool {
        let mut services = rw_write(&self.services, SOURCE, "unregister");
        let before = services.len();
        services.retain(|service| {
            service
                .descriptor()
                .map(|descriptor| descriptor.name != name)
                .unwrap_or(true)
        });
        services.len() != before
    }

    pub fn len(&self) -> usize {
        rw_read(&self.services, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ServiceRegistry for StaticServiceRegistry {
    fn services(&self) -> Result<Vec<Arc<dyn PluggableService>>, DiscoveryError> {
        Ok(rw_read(&self.services, SOURCE, "services").clone())
    }
}

/// Service assembled from ready-made resolvers.
pub struct BundledService {
    name: String,
    labels: Option<TextResolver>,
    descriptions: Option<TextResolver>,
    types: Option<TypeResolver>,
}

impl BundledService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: None,
            descriptions: None,
            types: None,
        }
    }

    pub fn with_labels(mut self, resolver: TextResolver) -> Self {
        self.labels = Some(resolver);
        self
    }

    pub fn with_descriptions(mut self, resolver: TextResolver) -> Self {
        self.descriptions = Some(resolver);
        self
    }

    pub fn with_types(mut self, resolver: TypeResolver) -> Self {
        self.types = Some(resolver);
        self
    }
}

impl PluggableService for BundledService {
    fn descriptor(&self) -> Result<ServiceDescriptor, DiscoveryError> {
        Ok(ServiceDescriptor {
            name: self.name.clone(),
            capabilities: Capabilities {
                labels: self.labels.is_some(),
                descriptions: self.descriptions.is_some(),
                types: self.types.is_some(),
            },
        })
    }

    fn label_resolver(&self) -> Result<TextResolver, DiscoveryError> {
        self.labels
            .clone()
            .ok_or_else(|| DiscoveryError::unsupported(Capability::Label))
    }

    fn description_resolver(&self) -> Result<TextResolver, DiscoveryError> {
        self.descriptions
            .clone()
            .ok_or_else(|| DiscoveryError::unsupported(Capability::Description))
    }

    fn type_resolver(&self) -> Result<TypeResolver, DiscoveryError> {
        self.types
            .clone()
            .ok_or_else(|| DiscoveryError::unsupported(Capability::Type))
    }
}

struct DiscoveredChains {
    labels: TextResolver,
    descriptions: TextResolver,
    types: TypeResolver,
}

/// Lazily discovered label, description and type chains.
pub struct DiscoveryResolver {
    id: String,
    registry: Arc<dyn ServiceRegistry>,
    chains: Mutex<Option<Arc<DiscoveredChains>>>,
    builds: AtomicUsize,
}

impl DiscoveryResolver {
    pub fn new(id: impl Into<String>, registry: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            id: id.into(),
            registry,
            chains: Mutex::new(None),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn labels(&self) -> TextResolver {
        Arc::clone(&self.chains().labels)
    }

    pub fn descriptions(&self) -> TextResolver {
        Arc::clone(&self.chains().descriptions)
    }

    pub fn types(&self) -> TypeResolver {
        Arc::clone(&self.chains().types)
    }

    /// Number of times the chains have been (re)built.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    fn chains(&self) -> Arc<DiscoveredChains> {
        let mut guard = mutex_lock(&self.chains, SOURCE, "chains");
        if let Some(chains) = guard.as_ref() {
            return Arc::clone(chains);
        }
        let chains = Arc::new(self.build());
        *guard = Some(Arc::clone(&chains));
        chains
    }

    fn build(&self) -> DiscoveredChains {
        self.builds.fetch_add(1, Ordering::Relaxed);
        let services = self.registry.services();
        if let Err(err) = &services {
            warn!(discovery = %self.id, error = %err, "Service registry unavailable");
        }

        let chains = DiscoveredChains {
            labels: self.capability_or_noop(&services, Capability::Label, |s| s.label_resolver()),
            descriptions: self.capability_or_noop(&services, Capability::Description, |s| {
                s.description_resolver()
            }),
            types: self.capability_or_noop(&services, Capability::Type, |s| s.type_resolver()),
        };
        info!(discovery = %self.id, "Rebuilt resolver chains");
        chains
    }

    fn capability_or_noop<V>(
        &self,
        services: &Result<Vec<Arc<dyn PluggableService>>, DiscoveryError>,
        capability: Capability,
        resolver_of: impl Fn(&dyn PluggableService) -> Result<Arc<dyn Resolver<V>>, DiscoveryError>,
    ) -> Arc<dyn Resolver<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let name = format!("{}:{capability}", self.id);
        let built = match services {
            Ok(services) => build_capability(&name, services, capability, resolver_of),
            Err(err) => Err(DiscoveryError::Registry(err.to_string())),
        };
        built.unwrap_or_else(|err| {
            warn!(
                discovery = %self.id,
                capability = %capability,
                error = %err,
                "Capability degraded to no-op"
            );
            Arc::new(NoopResolver::new(name))
        })
    }
}

fn build_capability<V>(
    name: &str,
    services: &[Arc<dyn PluggableService>],
    capability: Capability,
    resolver_of: impl Fn(&dyn PluggableService) -> Result<Arc<dyn Resolver<V>>, DiscoveryError>,
) -> Result<Arc<dyn Resolver<V>>, DiscoveryError>
where
    V: Clone + Send + Sync + 'static,
{
    let mut delegates = Vec::new();
    for service in services {
        let descriptor = service.descriptor()?;
        if descriptor.capabilities.supports(capability) {
            delegates.push(resolver_of(service.as_ref())?);
        }
    }
    debug!(chain = name, delegates = delegates.len(), "Discovered delegates");

    Ok(match delegates.len() {
        0 => Arc::new(NoopResolver::new(name)),
        1 => delegates.remove(0),
        _ => Arc::new(DelegatingResolver::new(name, delegates)),
    })
}

impl Reloadable for DiscoveryResolver {
    fn id(&self) -> &str {
        &self.id
    }

    fn reload(&self) {
        mutex_lock(&self.chains, SOURCE, "reload").take();
        debug!(discovery = %self.id, "Dropped discovered chains");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;

    use super::*;
    use crate::application::error::ResolveError;
    use crate::application::store::StoreHandle;
    use crate::domain::types::{PreferredLanguages, Resolution};

    struct Fixed(&'static str);

    #[async_trait]
    impl Resolver<TextValue> for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn resolve_many(
            &self,
            _store: &StoreHandle,
            ids: &HashSet<ResourceId>,
            _languages: &PreferredLanguages,
        ) -> Result<HashMap<ResourceId, Resolution<TextValue>>, ResolveError> {
            Ok(ids
                .iter()
                .map(|id| (id.clone(), Resolution::Found(TextValue::plain(self.0))))
                .collect())
        }
    }

    /// Claims labels but cannot build them.
    struct Broken;

    impl PluggableService for Broken {
        fn descriptor(&self) -> Result<ServiceDescriptor, DiscoveryError> {
            Ok(ServiceDescriptor {
                name: "broken".to_string(),
                capabilities: Capabilities {
                    labels: true,
                    descriptions: false,
                    types: false,
                },
            })
        }

        fn label_resolver(&self) -> Result<TextResolver, DiscoveryError> {
            Err(DiscoveryError::build("broken", Capability::Label, "peer unreachable"))
        }
    }

    fn fixed(name: &'static str) -> TextResolver {
        Arc::new(Fixed(name))
    }

    async fn label_of(discovery: &DiscoveryResolver) -> Option<TextValue> {
        discovery
            .labels()
            .resolve_one(
                &StoreHandle::new("s"),
                &ResourceId::from("urn:a"),
                &PreferredLanguages::single("en"),
            )
            .await
            .expect("resolution")
    }

    #[tokio::test]
    async fn no_services_means_noop_everywhere() {
        let discovery = DiscoveryResolver::new("discovery", Arc::new(StaticServiceRegistry::new()));

        assert_eq!(label_of(&discovery).await, None);
        assert_eq!(discovery.build_count(), 1);
    }

    #[tokio::test]
    async fn single_service_is_used_directly() {
        let registry = Arc::new(StaticServiceRegistry::new());
        registry.register(Arc::new(BundledService::new("local").with_labels(fixed("local"))));
        let discovery = DiscoveryResolver::new("discovery", registry);

        assert_eq!(discovery.labels().name(), "local");
        assert_eq!(label_of(&discovery).await, Some(TextValue::plain("local")));
    }

    #[tokio::test]
    async fn several_services_are_chained_in_registration_order() {
        let registry = Arc::new(StaticServiceRegistry::new());
        registry.register(Arc::new(BundledService::new("first").with_labels(fixed("first"))));
        registry.register(Arc::new(BundledService::new("second").with_labels(fixed("second"))));
        let discovery = DiscoveryResolver::new("discovery", registry);

        assert_eq!(discovery.labels().name(), "discovery:label");
        assert_eq!(label_of(&discovery).await, Some(TextValue::plain("first")));
    }

    #[tokio::test]
    async fn failing_capability_degrades_alone() {
        let registry = Arc::new(StaticServiceRegistry::new());
        registry.register(Arc::new(Broken));
        registry.register(Arc::new(
            BundledService::new("local")
                .with_labels(fixed("local"))
                .with_descriptions(fixed("described")),
        ));
        let discovery = DiscoveryResolver::new("discovery", registry);

        assert_eq!(label_of(&discovery).await, None);
        let description = discovery
            .descriptions()
            .resolve_one(
                &StoreHandle::new("s"),
                &ResourceId::from("urn:a"),
                &PreferredLanguages::single("en"),
            )
            .await
            .expect("resolution");
        assert_eq!(description, Some(TextValue::plain("described")));
    }

    #[tokio::test]
    async fn chains_are_memoized_until_reload() {
        let registry = Arc::new(StaticServiceRegistry::new());
        let discovery = DiscoveryResolver::new("discovery", registry.clone());

        assert_eq!(label_of(&discovery).await, None);
        registry.register(Arc::new(BundledService::new("late").with_labels(fixed("late"))));
        assert_eq!(label_of(&discovery).await, None);
        assert_eq!(discovery.build_count(), 1);

        discovery.reload();

        assert_eq!(label_of(&discovery).await, Some(TextValue::plain("late")));
        assert_eq!(discovery.build_count(), 2);
    }

    #[test]
    fn unregister_removes_by_name() {
        let registry = StaticServiceRegistry::new();
        registry.register(Arc::new(BundledService::new("a")));
        registry.register(Arc::new(BundledService::new("b")));

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert_eq!(registry.len(), 1);
    }
}
