//! Per-store caches and the central invalidation signal.
//!
//! Resolved text is cached in [`PartitionedCache`] instances, one LRU
//! partition per store. Every cache registers with the [`CacheRegistry`];
//! changes are announced through the [`InvalidationTrigger`], queued as
//! events, merged into an [`InvalidationPlan`] and applied by the
//! [`InvalidationConsumer`].
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! per_store_limit = 10000
//! ttl_seconds = 0
//! # ... see config.rs for all options
//! ```

mod config;
mod consumer;
mod events;
mod keys;
mod lock;
mod partitioned;
mod planner;
mod registry;
mod trigger;

pub use config::CacheConfig;
pub use consumer::InvalidationConsumer;
pub use events::{Epoch, EventKind, EventQueue, InvalidationEvent};
pub use keys::{CacheKey, identity_resource, key_resource};
pub use partitioned::{CacheLoader, KeyScope, LoadError, PartitionedCache};
pub use planner::InvalidationPlan;
pub use registry::{CacheRegistry, InvalidationTarget, Reloadable};
pub use trigger::InvalidationTrigger;

pub(crate) use lock::{mutex_lock, rw_read, rw_write};
