//! Cache key for language-dependent text.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::domain::types::{LanguageTag, PreferredLanguages, ResourceId};

/// Resource plus the preference list it is resolved with.
///
/// Identity is `(resource, effective language)`: keys that differ only in
/// their fallback languages share one cache slot. The full list is kept for
/// the loader.
#[derive(Debug, Clone)]
pub struct CacheKey {
    resource: ResourceId,
    languages: PreferredLanguages,
}

impl CacheKey {
    pub fn new(resource: ResourceId, languages: PreferredLanguages) -> Self {
        Self {
            resource,
            languages,
        }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn effective_language(&self) -> &LanguageTag {
        self.languages.effective()
    }

    pub fn languages(&self) -> &PreferredLanguages {
        &self.languages
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource && self.effective_language() == other.effective_language()
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.effective_language().hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource, self.effective_language())
    }
}

/// Resource a text key belongs to, for scoped invalidation.
pub fn key_resource(key: &CacheKey) -> &ResourceId {
    key.resource()
}

/// Scope of a key that already is a resource id.
pub fn identity_resource(key: &ResourceId) -> &ResourceId {
    key
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn key(resource: &str, languages: &[&str]) -> CacheKey {
        CacheKey::new(
            ResourceId::from(resource),
            PreferredLanguages::new(languages.iter().copied()).expect("non-empty"),
        )
    }

    #[test]
    fn keys_differing_only_in_fallbacks_collapse() {
        let mut keys = HashSet::new();
        keys.insert(key("urn:a", &["en", "de"]));
        keys.insert(key("urn:a", &["en", "fr"]));
        keys.insert(key("urn:a", &["EN"]));

        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn effective_language_separates_keys() {
        assert_ne!(key("urn:a", &["en"]), key("urn:a", &["de", "en"]));
        assert_ne!(key("urn:a", &["en"]), key("urn:b", &["en"]));
    }

    #[test]
    fn display_shows_resource_and_effective_language() {
        assert_eq!(key("urn:a", &["de", "en"]).to_string(), "urn:a@de");
    }
}
