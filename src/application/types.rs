//! Batched resolution of a resource's type.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::application::batch::{BatchSettings, run_partitioned};
use crate::application::error::ResolveError;
use crate::application::query::PatternQuery;
use crate::application::store::{GraphStore, StoreHandle};
use crate::cache::{CacheLoader, LoadError};
use crate::domain::types::{ResourceId, Resolution, Term};

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Resolves the first IRI bound by the candidate type properties, in
/// priority order.
#[derive(Clone)]
pub struct TypeLoader {
    graph: Arc<dyn GraphStore>,
    candidates: Arc<[String]>,
    settings: BatchSettings,
}

impl TypeLoader {
    pub fn new(graph: Arc<dyn GraphStore>, candidates: Vec<String>, settings: BatchSettings) -> Self {
        Self {
            graph,
            candidates: candidates.into(),
            settings,
        }
    }

    #[instrument(skip_all, fields(store = %store, ids = ids.len()))]
    pub async fn resolve(
        &self,
        store: &StoreHandle,
        ids: &HashSet<ResourceId>,
    ) -> Result<HashMap<ResourceId, Resolution<ResourceId>>, ResolveError> {
        let mut ids: Vec<ResourceId> = ids.iter().cloned().collect();
        ids.sort();
        let graph = Arc::clone(&self.graph);
        let candidates = Arc::clone(&self.candidates);
        let target = store.clone();

        run_partitioned(&self.settings, store, ids, move |batch| {
            let graph = Arc::clone(&graph);
            let candidates = Arc::clone(&candidates);
            let store = target.clone();
            async move { resolve_batch(graph.as_ref(), &store, &candidates, batch).await }
        })
        .await
    }
}

async fn resolve_batch(
    graph: &dyn GraphStore,
    store: &StoreHandle,
    candidates: &[String],
    ids: Vec<ResourceId>,
) -> Result<HashMap<ResourceId, Resolution<ResourceId>>, ResolveError> {
    let query = PatternQuery::build(candidates, ids.clone())?;
    debug!(store = %store, query = %query.text(), "Running type batch query");
    let rows = graph
        .run_pattern_query(store, &query)
        .await
        .map_err(|source| ResolveError::store(store, source))?;
    let mut matches = query
        .collect_matches(rows, |term| match term {
            Term::Iri(iri) => Some(iri),
            Term::Literal(_) => None,
        })
        .map_err(|source| ResolveError::store(store, source))?;

    Ok(ids
        .into_iter()
        .map(|id| {
            let first = matches
                .remove(&id)
                .and_then(|types| types.into_iter().next());
            (id, Resolution::from_lookup(first))
        })
        .collect())
}

#[async_trait]
impl CacheLoader<ResourceId, ResourceId> for TypeLoader {
    async fn load(&self, store: &StoreHandle, key: &ResourceId) -> Result<ResourceId, LoadError> {
        let ids = HashSet::from([key.clone()]);
        let mut resolved = self
            .resolve(store, &ids)
            .await
            .map_err(|err| LoadError::failed(err.to_string()))?;
        match resolved.remove(key) {
            Some(Resolution::Found(value)) => Ok(value),
            _ => Err(LoadError::NotFound),
        }
    }

    async fn load_all(
        &self,
        store: &StoreHandle,
        keys: &[ResourceId],
    ) -> Result<HashMap<ResourceId, Resolution<ResourceId>>, ResolveError> {
        let ids: HashSet<ResourceId> = keys.iter().cloned().collect();
        self.resolve(store, &ids).await
    }
}
