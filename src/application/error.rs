use std::time::Duration;

use thiserror::Error;

use crate::application::query::QueryError;
use crate::application::store::{StoreError, StoreHandle};
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Fatal failure of a resolution batch.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid candidate properties: {0}")]
    Configuration(#[from] QueryError),
    #[error("store `{store}` failed")]
    Store {
        store: StoreHandle,
        #[source]
        source: StoreError,
    },
    #[error("resolution against `{store}` timed out after {timeout:?} ({batches} batches)")]
    Timeout {
        store: StoreHandle,
        timeout: Duration,
        batches: usize,
    },
    #[error("batch worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ResolveError {
    pub fn store(store: &StoreHandle, source: StoreError) -> Self {
        Self::Store {
            store: store.clone(),
            source,
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
