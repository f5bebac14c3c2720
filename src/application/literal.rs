//! Batched resolution of language-tagged text from a graph store.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::application::batch::{BatchSettings, run_partitioned};
use crate::application::error::ResolveError;
use crate::application::query::PatternQuery;
use crate::application::store::{GraphStore, StoreHandle};
use crate::cache::{CacheKey, CacheLoader, LoadError};
use crate::domain::language::select_preferred;
use crate::domain::types::{ResourceId, Resolution, Term, TextValue};

/// Resolves one text value per key with one combined query per batch.
///
/// Candidate properties are tried in priority order; among the values found
/// the key's language preferences pick the winner.
#[derive(Clone)]
pub struct LiteralLoader {
    graph: Arc<dyn GraphStore>,
    candidates: Arc<[String]>,
    settings: BatchSettings,
}

impl LiteralLoader {
    pub fn new(graph: Arc<dyn GraphStore>, candidates: Vec<String>, settings: BatchSettings) -> Self {
        Self {
            graph,
            candidates: candidates.into(),
            settings,
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// One entry per key; unmatched keys resolve to `NotFound`.
    ///
    /// A malformed candidate list, a store failure or a timeout fails the
    /// whole call.
    #[instrument(skip_all, fields(store = %store, keys = keys.len()))]
    pub async fn resolve(
        &self,
        store: &StoreHandle,
        keys: &HashSet<CacheKey>,
    ) -> Result<HashMap<CacheKey, Resolution<TextValue>>, ResolveError> {
        let keys: Vec<CacheKey> = keys.iter().cloned().collect();
        let graph = Arc::clone(&self.graph);
        let candidates = Arc::clone(&self.candidates);
        let target = store.clone();

        run_partitioned(&self.settings, store, keys, move |batch| {
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
    keys: Vec<CacheKey>,
) -> Result<HashMap<CacheKey, Resolution<TextValue>>, ResolveError> {
    let resources: BTreeSet<ResourceId> = keys.iter().map(|key| key.resource().clone()).collect();
    let query = PatternQuery::build(candidates, resources.into_iter().collect())?;
    debug!(
        store = %store,
        resources = query.resources().len(),
        branches = query.branch_count(),
        query = %query.text(),
        "Running literal batch query"
    );

    let rows = graph
        .run_pattern_query(store, &query)
        .await
        .map_err(|source| ResolveError::store(store, source))?;
    let matches = query
        .collect_matches(rows, |term| match term {
            Term::Literal(value) => Some(value),
            Term::Iri(_) => None,
        })
        .map_err(|source| ResolveError::store(store, source))?;

    Ok(keys
        .into_iter()
        .map(|key| {
            let languages = key.languages();
            let chosen = matches.get(key.resource()).and_then(|values| {
                select_preferred(values, languages.effective(), languages.fallbacks()).cloned()
            });
            (key, Resolution::from_lookup(chosen))
        })
        .collect())
}

#[async_trait]
impl CacheLoader<CacheKey, TextValue> for LiteralLoader {
    async fn load(&self, store: &StoreHandle, key: &CacheKey) -> Result<TextValue, LoadError> {
        let keys = HashSet::from([key.clone()]);
        let mut resolved = self
            .resolve(store, &keys)
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
        keys: &[CacheKey],
    ) -> Result<HashMap<CacheKey, Resolution<TextValue>>, ResolveError> {
        let keys: HashSet<CacheKey> = keys.iter().cloned().collect();
        self.resolve(store, &keys).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::application::store::{QueryRow, StoreError};
    use crate::domain::types::PreferredLanguages;

    /// Serves canned rows and records every query it receives.
    struct CannedStore {
        rows: Vec<QueryRow>,
        queries: Mutex<Vec<Vec<ResourceId>>>,
        fail: bool,
    }

    impl CannedStore {
        fn new(rows: Vec<QueryRow>) -> Arc<Self> {
            Arc::new(Self {
                rows,
                queries: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                rows: Vec::new(),
                queries: Mutex::new(Vec::new()),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl GraphStore for CannedStore {
        async fn run_pattern_query(
            &self,
            _store: &StoreHandle,
            query: &PatternQuery,
        ) -> Result<Vec<QueryRow>, StoreError> {
            self.queries
                .lock()
                .expect("queries lock")
                .push(query.resources().to_vec());
            if self.fail {
                return Err(StoreError::execution("connection reset"));
            }
            Ok(self
                .rows
                .iter()
                .filter(|row| query.resources().contains(&row.resource))
                .cloned()
                .collect())
        }
    }

    fn literal(resource: &str, index: usize, text: &str, lang: &str) -> QueryRow {
        QueryRow::new(resource, index, Term::Literal(TextValue::new(text, lang)))
    }

    fn key(resource: &str, languages: &[&str]) -> CacheKey {
        CacheKey::new(
            ResourceId::from(resource),
            PreferredLanguages::new(languages.iter().copied()).expect("non-empty"),
        )
    }

    fn literal_loader(store: Arc<CannedStore>, candidates: &[&str]) -> LiteralLoader {
        LiteralLoader::new(
            store,
            candidates.iter().map(|c| c.to_string()).collect(),
            BatchSettings::default(),
        )
    }

    #[tokio::test]
    async fn empty_input_runs_no_query() {
        let store = CannedStore::new(Vec::new());
        let loader = literal_loader(store.clone(), &["urn:label"]);

        let resolved = loader
            .resolve(&StoreHandle::new("s"), &HashSet::new())
            .await
            .expect("empty input");

        assert!(resolved.is_empty());
        assert!(store.queries.lock().expect("queries lock").is_empty());
    }

    #[tokio::test]
    async fn every_key_gets_an_entry() {
        let store = CannedStore::new(vec![literal("urn:a", 0, "A", "en")]);
        let loader = literal_loader(store, &["urn:label"]);
        let keys = HashSet::from([key("urn:a", &["en"]), key("urn:b", &["en"])]);

        let resolved = loader
            .resolve(&StoreHandle::new("s"), &keys)
            .await
            .expect("resolution");

        assert_eq!(resolved.len(), 2);
        assert_eq!(
            resolved[&key("urn:a", &["en"])],
            Resolution::Found(TextValue::new("A", "en"))
        );
        assert_eq!(resolved[&key("urn:b", &["en"])], Resolution::NotFound);
    }

    #[tokio::test]
    async fn earlier_property_wins_between_equal_languages() {
        let store = CannedStore::new(vec![
            literal("urn:a", 1, "From rdfs:label", "en"),
            literal("urn:a", 0, "From skos:prefLabel", "en"),
        ]);
        let loader = literal_loader(store, &["urn:prefLabel", "urn:label"]);
        let keys = HashSet::from([key("urn:a", &["de", "en"])]);

        let resolved = loader
            .resolve(&StoreHandle::new("s"), &keys)
            .await
            .expect("resolution");

        assert_eq!(
            resolved[&key("urn:a", &["de"])].value().map(|v| v.text.as_str()),
            Some("From skos:prefLabel")
        );
    }

    #[tokio::test]
    async fn language_beats_property_priority() {
        let store = CannedStore::new(vec![
            literal("urn:a", 0, "House", "en"),
            literal("urn:a", 1, "Haus", "de"),
        ]);
        let loader = literal_loader(store, &["urn:prefLabel", "urn:label"]);
        let keys = HashSet::from([key("urn:a", &["de", "en"])]);

        let resolved = loader
            .resolve(&StoreHandle::new("s"), &keys)
            .await
            .expect("resolution");

        assert_eq!(
            resolved[&key("urn:a", &["de"])].value().map(|v| v.text.as_str()),
            Some("Haus")
        );
    }

    #[tokio::test]
    async fn each_key_uses_its_own_preferences() {
        let store = CannedStore::new(vec![
            literal("urn:a", 0, "House", "en"),
            literal("urn:a", 0, "Haus", "de"),
        ]);
        let loader = literal_loader(store.clone(), &["urn:label"]);
        let keys = HashSet::from([key("urn:a", &["en"]), key("urn:a", &["de"])]);

        let resolved = loader
            .resolve(&StoreHandle::new("s"), &keys)
            .await
            .expect("resolution");

        assert_eq!(resolved.len(), 2);
        assert_eq!(
            resolved[&key("urn:a", &["de"])].value().map(|v| v.text.as_str()),
            Some("Haus")
        );
        let queries = store.queries.lock().expect("queries lock");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0], vec![ResourceId::from("urn:a")]);
    }

    #[tokio::test]
    async fn store_failure_is_fatal() {
        let loader = literal_loader(CannedStore::failing(), &["urn:label"]);
        let keys = HashSet::from([key("urn:a", &["en"])]);

        let err = loader
            .resolve(&StoreHandle::new("s"), &keys)
            .await
            .expect_err("store failure");
        assert!(matches!(err, ResolveError::Store { .. }));
    }

    #[tokio::test]
    async fn malformed_candidates_are_fatal() {
        let loader = literal_loader(CannedStore::new(Vec::new()), &["urn:label", ""]);
        let keys = HashSet::from([key("urn:a", &["en"])]);

        let err = loader
            .resolve(&StoreHandle::new("s"), &keys)
            .await
            .expect_err("malformed candidates");
        assert!(matches!(err, ResolveError::Configuration(_)));
    }

    #[tokio::test]
    async fn single_key_load_maps_absence_to_not_found() {
        let loader = literal_loader(CannedStore::new(Vec::new()), &["urn:label"]);

        let err = loader
            .load(&StoreHandle::new("s"), &key("urn:a", &["en"]))
            .await
            .expect_err("no value");
        assert_eq!(err, LoadError::NotFound);

        let failing = literal_loader(CannedStore::failing(), &["urn:label"]);
        let err = failing
            .load(&StoreHandle::new("s"), &key("urn:a", &["en"]))
            .await
            .expect_err("store failure");
        assert!(matches!(err, LoadError::Failed(_)));
    }
}
