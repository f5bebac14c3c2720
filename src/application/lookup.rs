//! Entry point used by the HTTP surface and the CLI.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::application::discovery::{DiscoveryResolver, TextResolver};
use crate::application::error::ResolveError;
use crate::application::store::StoreHandle;
use crate::domain::types::{PreferredLanguages, ResourceId, TextValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextKind {
    Label,
    Description,
}

impl TextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Description => "description",
        }
    }
}

impl fmt::Display for TextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct TextLookup {
    discovery: Arc<DiscoveryResolver>,
    default_languages: PreferredLanguages,
}

impl TextLookup {
    pub fn new(discovery: Arc<DiscoveryResolver>, default_languages: PreferredLanguages) -> Self {
        Self {
            discovery,
            default_languages,
        }
    }

    pub fn discovery(&self) -> &Arc<DiscoveryResolver> {
        &self.discovery
    }

    pub fn default_languages(&self) -> &PreferredLanguages {
        &self.default_languages
    }

    /// `preferred` first, then the configured defaults.
    ///
    /// A present but blank preference asks for untagged text first.
    pub fn languages_for(&self, preferred: Option<&str>) -> PreferredLanguages {
        match preferred.map(str::trim) {
            Some(tag) => PreferredLanguages::with_primary(tag, &self.default_languages),
            None => self.default_languages.clone(),
        }
    }

    /// One entry per requested id; `None` when nothing was found.
    #[instrument(skip_all, fields(store = %store, ids = ids.len(), kind = %kind))]
    pub async fn resolve(
        &self,
        store: &StoreHandle,
        ids: &HashSet<ResourceId>,
        preferred: Option<&str>,
        kind: TextKind,
    ) -> Result<HashMap<ResourceId, Option<TextValue>>, ResolveError> {
        let languages = self.languages_for(preferred);
        let resolver = self.text_resolver(kind);
        let mut resolved = resolver.resolve_many(store, ids, &languages).await?;

        Ok(ids
            .iter()
            .map(|id| {
                let value = resolved.remove(id).and_then(|r| r.into_value());
                (id.clone(), value)
            })
            .collect())
    }

    pub async fn resolve_one(
        &self,
        store: &StoreHandle,
        id: &ResourceId,
        preferred: Option<&str>,
        kind: TextKind,
    ) -> Result<Option<TextValue>, ResolveError> {
        let languages = self.languages_for(preferred);
        self.text_resolver(kind)
            .resolve_one(store, id, &languages)
            .await
    }

    #[instrument(skip_all, fields(store = %store, ids = ids.len()))]
    pub async fn resolve_types(
        &self,
        store: &StoreHandle,
        ids: &HashSet<ResourceId>,
    ) -> Result<HashMap<ResourceId, Option<ResourceId>>, ResolveError> {
        let mut resolved = self
            .discovery
            .types()
            .resolve_many(store, ids, &self.default_languages)
            .await?;

        Ok(ids
            .iter()
            .map(|id| {
                let value = resolved.remove(id).and_then(|r| r.into_value());
                (id.clone(), value)
            })
            .collect())
    }

    fn text_resolver(&self, kind: TextKind) -> TextResolver {
        match kind {
            TextKind::Label => self.discovery.labels(),
            TextKind::Description => self.discovery.descriptions(),
        }
    }
}
