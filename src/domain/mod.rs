//! Domain value types and the language tie-break.

pub mod error;
pub mod language;
pub mod types;

pub use error::DomainError;
pub use language::select_preferred;
pub use types::{LanguageTag, PreferredLanguages, Resolution, ResourceId, Term, TextValue};
