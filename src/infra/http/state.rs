use std::sync::Arc;

use crate::application::lookup::TextLookup;
use crate::cache::InvalidationTrigger;

#[derive(Clone)]
pub struct LookupState {
    pub lookup: Arc<TextLookup>,
    pub trigger: Arc<InvalidationTrigger>,
}
