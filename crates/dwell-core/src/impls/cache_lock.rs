//! CacheLeaseLock - lease lock on top of the staging cache's set-if-absent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::LeaseToken;
use crate::ports::{CacheError, IdGenerator, LeaseLock, StagingCache};

pub struct CacheLeaseLock {
    cache: Arc<dyn StagingCache>,
    ids: Arc<dyn IdGenerator>,
}

impl CacheLeaseLock {
    pub fn new(cache: Arc<dyn StagingCache>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { cache, ids }
    }
}

#[async_trait]
impl LeaseLock for CacheLeaseLock {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LeaseToken>, CacheError> {
        let token = self.ids.generate_lease_token();
        let acquired = self
            .cache
            .set_if_absent(name, &token.to_string(), ttl)
            .await?;
        Ok(acquired.then_some(token))
    }
}
