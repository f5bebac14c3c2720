//! Value types shared by every resolver layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Stable global identifier of a graph resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Language tag of a literal, compared case-insensitively.
///
/// The empty tag means "no language".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn new(tag: &str) -> Self {
        Self(tag.trim().to_ascii_lowercase())
    }

    /// The "no language" tag.
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LanguageTag {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for LanguageTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<LanguageTag> for String {
    fn from(value: LanguageTag) -> Self {
        value.0
    }
}

/// Display text with an optional language tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextValue {
    pub text: String,
    #[serde(default, skip_serializing_if = "LanguageTag::is_none")]
    pub language: LanguageTag,
}

impl TextValue {
    pub fn new(text: impl Into<String>, language: &str) -> Self {
        Self {
            text: text.into(),
            language: LanguageTag::new(language),
        }
    }

    /// A value without a language tag.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: LanguageTag::none(),
        }
    }
}

impl fmt::Display for TextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.language.is_none() {
            write!(f, "\"{}\"", self.text)
        } else {
            write!(f, "\"{}\"@{}", self.text, self.language)
        }
    }
}

/// A value bound by a store query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(ResourceId),
    Literal(TextValue),
}

/// Ordered, non-empty list of preferred languages.
///
/// The first entry is the effective language; the rest are fallbacks in
/// decreasing order of preference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreferredLanguages(Vec<LanguageTag>);

impl PreferredLanguages {
    pub fn new<I, T>(languages: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = T>,
        T: Into<LanguageTag>,
    {
        let languages: Vec<LanguageTag> = languages.into_iter().map(Into::into).collect();
        if languages.is_empty() {
            return Err(DomainError::invariant(
                "preferred language list must contain at least one entry",
            ));
        }
        Ok(Self(languages))
    }

    /// A single-entry preference.
    pub fn single(language: impl Into<LanguageTag>) -> Self {
        Self(vec![language.into()])
    }

    /// Puts `primary` in front of `fallbacks`, dropping later duplicates.
    pub fn with_primary(primary: impl Into<LanguageTag>, fallbacks: &PreferredLanguages) -> Self {
        let primary = primary.into();
        let mut languages = Vec::with_capacity(fallbacks.0.len() + 1);
        languages.push(primary);
        for language in &fallbacks.0 {
            if !languages.contains(language) {
                languages.push(language.clone());
            }
        }
        Self(languages)
    }

    pub fn effective(&self) -> &LanguageTag {
        &self.0[0]
    }

    pub fn fallbacks(&self) -> &[LanguageTag] {
        &self.0[1..]
    }

    pub fn as_slice(&self) -> &[LanguageTag] {
        &self.0
    }
}

impl fmt::Display for PreferredLanguages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|tag| if tag.is_none() { "\"\"" } else { tag.as_str() })
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

/// Outcome of resolving one resource.
///
/// `NotFound` is a confirmed absence and may be cached; `Unknown` means the
/// resource has not been looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<V> {
    Found(V),
    NotFound,
    Unknown,
}

impl<V> Resolution<V> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound | Self::Unknown => None,
        }
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound | Self::Unknown => None,
        }
    }

    /// Confirmed lookup result: `Some` is found, `None` is a negative entry.
    pub fn from_lookup(value: Option<V>) -> Self {
        match value {
            Some(value) => Self::Found(value),
            None => Self::NotFound,
        }
    }
}
