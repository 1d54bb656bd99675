//! RedisStagingCache - production staging cache.
//!
//! Uses a `ConnectionManager` (auto-reconnecting, cheap to clone) and issues
//! one command per primitive. Migration runs as a Lua script so the range,
//! push and remove happen in a single atomic step on the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};

use crate::ports::{CacheError, StagingCache};

/// KEYS[1] = future set, KEYS[2] = ready list, ARGV[1] = max score.
const MIGRATE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], 0, ARGV[1])
for _, member in ipairs(due) do
    redis.call('LPUSH', KEYS[2], member)
    redis.call('ZREM', KEYS[1], member)
end
return #due
"#;

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            CacheError::Unavailable(err.to_string())
        } else {
            CacheError::OperationFailed(err.to_string())
        }
    }
}

#[derive(Clone)]
pub struct RedisStagingCache {
    conn: ConnectionManager,
    migrate: Script,
}

impl RedisStagingCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("connected to redis staging cache");
        Ok(Self {
            conn,
            migrate: Script::new(MIGRATE_SCRIPT),
        })
    }
}

#[async_trait]
impl StagingCache for RedisStagingCache {
    async fn push_ready(&self, key: &str, payload: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: usize = conn.lpush(key, payload).await?;
        Ok(())
    }

    async fn pop_ready(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let popped: Option<String> = conn.rpop(key, None).await?;
        Ok(popped)
    }

    async fn remove_ready(&self, key: &str, payload: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.lrem(key, 0, payload).await?;
        Ok(removed)
    }

    async fn ready_len(&self, key: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }

    async fn add_future(&self, key: &str, payload: &str, score: i64) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: usize = conn.zadd(key, payload, score).await?;
        Ok(())
    }

    async fn range_future(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrangebyscore(key, min, max).await?;
        Ok(members)
    }

    async fn remove_future(&self, key: &str, payload: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.zrem(key, payload).await?;
        Ok(removed)
    }

    async fn future_len(&self, key: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.zcard(key).await?;
        Ok(len)
    }

    async fn migrate_due(
        &self,
        future_key: &str,
        ready_key: &str,
        max_score: i64,
    ) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let moved: usize = self
            .migrate
            .key(future_key)
            .key(ready_key)
            .arg(max_score)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let deleted: usize = conn.del(keys).await?;
        Ok(deleted)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}

#[cfg(test)]
mod tests {
    //! Run against a live server with `DWELL_TEST_REDIS_URL=redis://127.0.0.1/`.
    use super::*;

    async fn cache() -> Option<RedisStagingCache> {
        let url = std::env::var("DWELL_TEST_REDIS_URL").ok()?;
        Some(RedisStagingCache::connect(&url).await.unwrap())
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}{}_0", 100_000 + u32::from(rand::random::<u16>()))
    }

    #[tokio::test]
    async fn migrate_script_moves_due_members() {
        let Some(cache) = cache().await else {
            return;
        };
        let partition = unique("");
        let future = format!("FUTURE:{partition}");
        let ready = format!("READY:{partition}");
        cache
            .delete(&[future.clone(), ready.clone()])
            .await
            .unwrap();

        cache.add_future(&future, "first", 100).await.unwrap();
        cache.add_future(&future, "later", 900).await.unwrap();

        assert_eq!(cache.migrate_due(&future, &ready, 500).await.unwrap(), 1);
        assert_eq!(cache.pop_ready(&ready).await.unwrap().as_deref(), Some("first"));
        assert_eq!(cache.future_len(&future).await.unwrap(), 1);

        cache.delete(&[future, ready]).await.unwrap();
    }

    #[tokio::test]
    async fn set_if_absent_is_exclusive() {
        let Some(cache) = cache().await else {
            return;
        };
        let key = unique("dwell-test-lock-");
        let ttl = Duration::from_secs(5);

        assert!(cache.set_if_absent(&key, "a", ttl).await.unwrap());
        assert!(!cache.set_if_absent(&key, "b", ttl).await.unwrap());

        cache.delete(&[key]).await.unwrap();
    }
}
