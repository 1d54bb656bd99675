//! LeaseLock port - TTL-bounded mutual exclusion across scheduler instances.
//!
//! A lease is never released explicitly. It expires after its TTL, so a
//! crashed holder blocks the next holder for at most one TTL.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::LeaseToken;
use crate::ports::CacheError;

#[async_trait]
pub trait LeaseLock: Send + Sync {
    /// Returns the lease token if the lock was free, `None` if another
    /// holder's lease is still live.
    async fn try_acquire(&self, name: &str, ttl: Duration)
    -> Result<Option<LeaseToken>, CacheError>;
}
