//! Impls - port implementations.
//!
//! - **InMemoryTaskStore / InMemoryStagingCache**: development and tests
//! - **SqliteTaskStore**: relational durable store
//! - **RedisStagingCache**: production staging cache
//! - **CacheLeaseLock**: lease lock over any `StagingCache`

pub mod cache_lock;
pub mod inmem_cache;
pub mod inmem_store;
pub mod redis_cache;
pub mod sqlite_store;

pub use self::cache_lock::CacheLeaseLock;
pub use self::inmem_cache::InMemoryStagingCache;
pub use self::inmem_store::InMemoryTaskStore;
pub use self::redis_cache::RedisStagingCache;
pub use self::sqlite_store::SqliteTaskStore;
