//! Graph store contract consumed by the batched loaders.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::application::query::PatternQuery;
use crate::domain::types::{ResourceId, Term};

/// Named repository a query runs against; also the cache partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreHandle(Arc<str>);

impl StoreHandle {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One binding produced by a pattern query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRow {
    pub resource: ResourceId,
    /// Position of the matching candidate property.
    pub property_index: usize,
    pub value: Term,
}

impl QueryRow {
    pub fn new(resource: impl Into<ResourceId>, property_index: usize, value: Term) -> Self {
        Self {
            resource: resource.into(),
            property_index,
            value,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown store `{store}`")]
    UnknownStore { store: String },
    #[error("query execution failed: {message}")]
    Execution { message: String },
    #[error("malformed query result: {message}")]
    Malformed { message: String },
}

impl StoreError {
    pub fn unknown_store(store: &StoreHandle) -> Self {
        Self::UnknownStore {
            store: store.name().to_string(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Executes combined pattern queries against a graph store.
///
/// Rows for one resource and one property index must be returned in store
/// order; that order is significant for tie-breaking.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn run_pattern_query(
        &self,
        store: &StoreHandle,
        query: &PatternQuery,
    ) -> Result<Vec<QueryRow>, StoreError>;
}
