//! Resolution services: batched loaders, resolver chains and discovery.

pub mod batch;
pub mod chain;
pub mod discovery;
pub mod error;
pub mod literal;
pub mod lookup;
pub mod query;
pub mod resolver;
pub mod store;
pub mod types;
