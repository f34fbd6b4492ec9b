//! Query cache for list results.
//!
//! Only one query shape is cached: list queries in the store's default order.
//! A result set is stored as a partition keyed by the query's fingerprint,
//! one hash per record, so a write to one record can find and rewrite (or
//! drop) every copy of it without knowing which queries produced them.
//!
//! # Key layout
//!
//! ```text
//! {prefix}:hash:{fingerprint}:serverId:{id}
//! ```
//!
//! Partitions are not transactional with the system of record. A record
//! created after a partition was filled only shows up once that partition
//! expires.

pub mod entry;
pub mod keys;
pub mod memory;
pub mod redis_backend;
pub mod traits;

pub use keys::{glob_match, CacheKeyspace};
pub use memory::InMemoryQueryCache;
pub use redis_backend::{RedisCacheError, RedisQueryCache};
pub use traits::{CacheConfig, CacheStats, QueryCache, StatsRecorder, POSITION_FIELD};
