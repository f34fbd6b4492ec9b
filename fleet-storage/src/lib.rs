//! Fleet Storage - Store and Cache Contracts
//!
//! Defines the inventory store abstraction, the query cache abstraction and
//! their in-memory implementations. The PostgreSQL store lives in fleet-api.

pub mod cache;
pub mod mock;
pub mod store;

pub use cache::{
    CacheConfig, CacheKeyspace, CacheStats, InMemoryQueryCache, QueryCache, RedisCacheError,
    RedisQueryCache,
};
pub use mock::{MockFileArtifacts, MockInventory};
pub use store::{FileArtifactStore, InventoryStore};
