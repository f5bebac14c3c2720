//! In-memory graph store, optionally seeded from a TOML dataset file.
//!
//! ```toml
//! [[stores]]
//! name = "museum"
//!
//! [[stores.triples]]
//! subject = "urn:vase"
//! predicate = "http://www.w3.org/2000/01/rdf-schema#label"
//! literal = "Vase"
//! language = "en"
//!
//! [[stores.triples]]
//! subject = "urn:vase"
//! predicate = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type"
//! object = "urn:Artifact"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::application::query::{PatternQuery, PropertyPath};
use crate::application::store::{GraphStore, QueryRow, StoreError, StoreHandle};
use crate::cache::{rw_read, rw_write};
use crate::domain::types::{ResourceId, Term, TextValue};
use crate::infra::error::InfraError;

const SOURCE: &str = "infra::memory";

#[derive(Debug, Default)]
struct Dataset {
    outgoing: HashMap<ResourceId, Vec<(String, Term)>>,
    incoming: HashMap<ResourceId, Vec<(String, ResourceId)>>,
    triples: usize,
}

impl Dataset {
    fn insert(&mut self, subject: ResourceId, predicate: String, object: Term) {
        if let Term::Iri(target) = &object {
            self.incoming
                .entry(target.clone())
                .or_default()
                .push((predicate.clone(), subject.clone()));
        }
        self.outgoing
            .entry(subject)
            .or_default()
            .push((predicate, object));
        self.triples += 1;
    }

    fn remove(&mut self, subject: &ResourceId, predicate: &str) -> usize {
        let Some(values) = self.outgoing.get_mut(subject) else {
            return 0;
        };
        let before = values.len();
        values.retain(|(p, _)| p != predicate);
        let removed = before - values.len();

        for targets in self.incoming.values_mut() {
            targets.retain(|(p, s)| !(p == predicate && s == subject));
        }
        self.triples -= removed;
        removed
    }

    /// Terms reached from `start` along `path`, in insertion order.
    fn evaluate(&self, start: &ResourceId, path: &PropertyPath) -> Vec<Term> {
        let mut frontier = vec![Term::Iri(start.clone())];
        for step in path.steps() {
            let mut next = Vec::new();
            for node in &frontier {
                let Term::Iri(node) = node else {
                    continue;
                };
                if step.inverse {
                    if let Some(sources) = self.incoming.get(node) {
                        next.extend(
                            sources
                                .iter()
                                .filter(|(p, _)| *p == step.iri)
                                .map(|(_, s)| Term::Iri(s.clone())),
                        );
                    }
                } else if let Some(values) = self.outgoing.get(node) {
                    next.extend(
                        values
                            .iter()
                            .filter(|(p, _)| *p == step.iri)
                            .map(|(_, o)| o.clone()),
                    );
                }
            }
            frontier = next;
        }
        frontier
    }
}

/// Named in-memory datasets answering pattern queries.
#[derive(Default)]
pub struct MemoryStore {
    stores: RwLock<HashMap<StoreHandle, Dataset>>,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, InfraError> {
        let data = fs::read_to_string(path)?;
        let store = Self::from_toml_str(&data)?;
        info!(path = %path.display(), stores = store.store_names().len(), "Loaded dataset");
        Ok(store)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, InfraError> {
        let file: DatasetFile = toml::from_str(data)
            .map_err(|err| InfraError::dataset(format!("invalid dataset: {err}")))?;

        let store = Self::new();
        for dataset in file.stores {
            let handle = StoreHandle::new(dataset.name.trim());
            if handle.name().is_empty() {
                return Err(InfraError::dataset("store name must not be empty"));
            }
            store.create_store(&handle);
            for triple in dataset.triples {
                let object = triple.term()?;
                store.insert(&handle, triple.subject.as_str(), &triple.predicate, object);
            }
        }
        Ok(store)
    }

    /// Creates an empty store; existing stores are left untouched.
    pub fn create_store(&self, store: &StoreHandle) {
        rw_write(&self.stores, SOURCE, "create_store")
            .entry(store.clone())
            .or_default();
    }

    pub fn drop_store(&self, store: &StoreHandle) -> bool {
        rw_write(&self.stores, SOURCE, "drop_store")
            .remove(store)
            .is_some()
    }

    /// Adds a triple, creating the store when needed.
    pub fn insert(&self, store: &StoreHandle, subject: &str, predicate: &str, object: Term) {
        rw_write(&self.stores, SOURCE, "insert")
            .entry(store.clone())
            .or_default()
            .insert(ResourceId::from(subject), predicate.to_string(), object);
    }

    /// Removes every value of `predicate` on `subject`.
    pub fn remove(&self, store: &StoreHandle, subject: &str, predicate: &str) -> usize {
        rw_write(&self.stores, SOURCE, "remove")
            .get_mut(store)
            .map(|dataset| dataset.remove(&ResourceId::from(subject), predicate))
            .unwrap_or(0)
    }

    pub fn store_names(&self) -> Vec<StoreHandle> {
        let mut names: Vec<StoreHandle> = rw_read(&self.stores, SOURCE, "store_names")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn triple_count(&self, store: &StoreHandle) -> usize {
        rw_read(&self.stores, SOURCE, "triple_count")
            .get(store)
            .map(|dataset| dataset.triples)
            .unwrap_or(0)
    }

    /// Pattern queries executed so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn run_pattern_query(
        &self,
        store: &StoreHandle,
        query: &PatternQuery,
    ) -> Result<Vec<QueryRow>, StoreError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let stores = rw_read(&self.stores, SOURCE, "run_pattern_query");
        let dataset = stores
            .get(store)
            .ok_or_else(|| StoreError::unknown_store(store))?;

        let mut rows = Vec::new();
        for resource in query.resources() {
            for (index, path) in query.branches().iter().enumerate() {
                rows.extend(
                    dataset
                        .evaluate(resource, path)
                        .into_iter()
                        .map(|value| QueryRow::new(resource.clone(), index, value)),
                );
            }
        }
        debug!(store = %store, rows = rows.len(), "Evaluated pattern query");
        Ok(rows)
    }
}

#[derive(Debug, Deserialize)]
struct DatasetFile {
    #[serde(default)]
    stores: Vec<StoreFile>,
}

#[derive(Debug, Deserialize)]
struct StoreFile {
    name: String,
    #[serde(default)]
    triples: Vec<TripleFile>,
}

#[derive(Debug, Deserialize)]
struct TripleFile {
    subject: String,
    predicate: String,
    object: Option<String>,
    literal: Option<String>,
    language: Option<String>,
}

impl TripleFile {
    fn term(&self) -> Result<Term, InfraError> {
        match (&self.object, &self.literal) {
            (Some(object), None) => Ok(Term::Iri(ResourceId::from(object.as_str()))),
            (None, Some(literal)) => Ok(Term::Literal(TextValue::new(
                literal.as_str(),
                self.language.as_deref().unwrap_or(""),
            ))),
            _ => Err(InfraError::dataset(format!(
                "triple on `{}` needs exactly one of `object` or `literal`",
                self.subject
            ))),
        }
    }
}
