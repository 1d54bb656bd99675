//! StagingCache port - the fast, disposable staging layer (Redis or InMemory).
//!
//! Primitives:
//! - list push-left / pop-right / remove-by-value (ready queues)
//! - sorted-set add / range / remove-by-value, scored by epoch millis
//!   (future sets)
//! - key enumeration by `prefix*` pattern and bulk delete
//! - set-if-absent with TTL (the lease lock is built on this)
//!
//! # Design
//! - the cache is never the source of truth; everything here can be
//!   cleared and rebuilt from the `TaskStore`
//! - `migrate_due` is one atomic operation: no caller ever observes a
//!   member in both the future set and the ready list

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait]
pub trait StagingCache: Send + Sync {
    /// Push to the head of a list.
    async fn push_ready(&self, key: &str, payload: &str) -> Result<(), CacheError>;

    /// Pop from the tail of a list. Atomic: two callers never get the same element.
    async fn pop_ready(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Remove every list element equal to `payload`; returns how many were removed.
    async fn remove_ready(&self, key: &str, payload: &str) -> Result<usize, CacheError>;

    async fn ready_len(&self, key: &str) -> Result<usize, CacheError>;

    async fn add_future(&self, key: &str, payload: &str, score: i64) -> Result<(), CacheError>;

    /// Members with `min <= score <= max`, lowest score first.
    async fn range_future(&self, key: &str, min: i64, max: i64)
    -> Result<Vec<String>, CacheError>;

    async fn remove_future(&self, key: &str, payload: &str) -> Result<usize, CacheError>;

    async fn future_len(&self, key: &str) -> Result<usize, CacheError>;

    /// Atomically move every member of `future_key` scored in `[0, max_score]`
    /// to the head of `ready_key`, lowest score pushed first.
    async fn migrate_due(
        &self,
        future_key: &str,
        ready_key: &str,
        max_score: i64,
    ) -> Result<usize, CacheError>;

    /// Keys matching a `prefix*` pattern.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError>;

    /// Set `key` to `value` with a TTL unless it already exists.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, CacheError>;
}
