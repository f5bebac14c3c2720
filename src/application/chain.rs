//! Ordered delegation across several resolvers of one capability.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::application::error::ResolveError;
use crate::application::resolver::Resolver;
use crate::application::store::StoreHandle;
use crate::domain::types::{PreferredLanguages, ResourceId, Resolution};

/// Asks each delegate in turn, handing on only the ids still unresolved.
///
/// An id leaves the working set once a delegate resolves it, or once a
/// delegate does not answer for it at all. Only a confirmed `NotFound` passes
/// it on to the next delegate. Ids left over at the end are reported as
/// `NotFound`, so the result always covers every input id.
pub struct DelegatingResolver<V> {
    name: String,
    delegates: Vec<Arc<dyn Resolver<V>>>,
}

impl<V> DelegatingResolver<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, delegates: Vec<Arc<dyn Resolver<V>>>) -> Self {
        Self {
            name: name.into(),
            delegates,
        }
    }

    pub fn delegates(&self) -> &[Arc<dyn Resolver<V>>] {
        &self.delegates
    }
}

#[async_trait]
impl<V> Resolver<V> for DelegatingResolver<V>
where
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
        for delegate in &self.delegates {
            if let Some(value) = delegate.resolve_one(store, id, languages).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    #[instrument(skip_all, fields(chain = %self.name, store = %store, ids = ids.len()))]
    async fn resolve_many(
        &self,
        store: &StoreHandle,
        ids: &HashSet<ResourceId>,
        languages: &PreferredLanguages,
    ) -> Result<HashMap<ResourceId, Resolution<V>>, ResolveError> {
        let mut accumulated: HashMap<ResourceId, Resolution<V>> = HashMap::with_capacity(ids.len());
        let mut remaining = ids.clone();

        for delegate in &self.delegates {
            if remaining.is_empty() {
                break;
            }
            let response = delegate.resolve_many(store, &remaining, languages).await?;

            let mut still_missing = HashSet::new();
            let mut unanswered = 0usize;
            for id in remaining {
                match response.get(&id) {
                    Some(Resolution::Found(value)) => {
                        accumulated
                            .entry(id)
                            .or_insert_with(|| Resolution::Found(value.clone()));
                    }
                    Some(Resolution::NotFound) => {
                        still_missing.insert(id);
                    }
                    Some(Resolution::Unknown) | None => unanswered += 1,
                }
            }

            debug!(
                delegate = delegate.name(),
                resolved = accumulated.len(),
                remaining = still_missing.len(),
                unanswered,
                "Delegate answered"
            );
            remaining = still_missing;
        }

        for id in ids {
            accumulated
                .entry(id.clone())
                .or_insert(Resolution::NotFound);
        }
        Ok(accumulated)
    }
}
