//! InMemoryStagingCache - development/test staging cache.
//!
//! Mirrors the Redis semantics the scheduler depends on:
//! - LPUSH / RPOP / LREM on lists
//! - ZADD / ZRANGEBYSCORE / ZREM on sorted sets (equal scores order by member)
//! - empty lists and sets disappear, so `scan` never returns them
//! - SET NX PX for string keys, expiry driven by the injected clock
//!
//! Every operation runs under one lock, which makes `migrate_due` atomic.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{CacheError, Clock, StagingCache};

#[derive(Default)]
struct CacheState {
    lists: HashMap<String, VecDeque<String>>,
    /// member -> score
    sorted_sets: HashMap<String, HashMap<String, i64>>,
    /// value, expires_at (epoch millis)
    strings: HashMap<String, (String, i64)>,
}

impl CacheState {
    fn sorted_range(&self, key: &str, min: i64, max: i64) -> Vec<(i64, String)> {
        let Some(set) = self.sorted_sets.get(key) else {
            return Vec::new();
        };
        let mut members: Vec<(i64, String)> = set
            .iter()
            .filter(|(_, score)| (min..=max).contains(*score))
            .map(|(member, score)| (*score, member.clone()))
            .collect();
        members.sort();
        members
    }

    fn evict_expired(&mut self, now_ms: i64) {
        self.strings.retain(|_, (_, expires_at)| *expires_at > now_ms);
    }
}

pub struct InMemoryStagingCache {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryStagingCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate a cache outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of a ready list, head first.
    pub async fn ready_snapshot(&self, key: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory cache marked unavailable".into()));
        }
        Ok(())
    }
}

fn matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl StagingCache for InMemoryStagingCache {
    async fn push_ready(&self, key: &str, payload: &str) -> Result<(), CacheError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(payload.to_string());
        Ok(())
    }

    async fn pop_ready(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(list) = state.lists.get_mut(key) else {
            return Ok(None);
        };
        let popped = list.pop_back();
        if list.is_empty() {
            state.lists.remove(key);
        }
        Ok(popped)
    }

    async fn remove_ready(&self, key: &str, payload: &str) -> Result<usize, CacheError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(list) = state.lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|item| item != payload);
        let removed = before - list.len();
        if list.is_empty() {
            state.lists.remove(key);
        }
        Ok(removed)
    }

    async fn ready_len(&self, key: &str) -> Result<usize, CacheError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.lists.get(key).map_or(0, VecDeque::len))
    }

    async fn add_future(&self, key: &str, payload: &str, score: i64) -> Result<(), CacheError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(payload.to_string(), score);
        Ok(())
    }

    async fn range_future(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, CacheError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .sorted_range(key, min, max)
            .into_iter()
            .map(|(_, member)| member)
            .collect())
    }

    async fn remove_future(&self, key: &str, payload: &str) -> Result<usize, CacheError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(set) = state.sorted_sets.get_mut(key) else {
            return Ok(0);
        };
        let removed = usize::from(set.remove(payload).is_some());
        if set.is_empty() {
            state.sorted_sets.remove(key);
        }
        Ok(removed)
    }

    async fn future_len(&self, key: &str) -> Result<usize, CacheError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.sorted_sets.get(key).map_or(0, HashMap::len))
    }

    async fn migrate_due(
        &self,
        future_key: &str,
        ready_key: &str,
        max_score: i64,
    ) -> Result<usize, CacheError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        let due = state.sorted_range(future_key, 0, max_score);
        if due.is_empty() {
            return Ok(0);
        }
        if let Some(set) = state.sorted_sets.get_mut(future_key) {
            for (_, member) in &due {
                set.remove(member);
            }
            if set.is_empty() {
                state.sorted_sets.remove(future_key);
            }
        }
        let list = state.lists.entry(ready_key.to_string()).or_default();
        for (_, member) in &due {
            list.push_front(member.clone());
        }
        Ok(due.len())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.evict_expired(self.clock.now_millis());

        let mut keys: Vec<String> = state
            .lists
            .keys()
            .chain(state.sorted_sets.keys())
            .chain(state.strings.keys())
            .filter(|key| matches_pattern(key, pattern))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let mut deleted = 0;
        for key in keys {
            let existed = state.lists.remove(key).is_some()
                | state.sorted_sets.remove(key).is_some()
                | state.strings.remove(key).is_some();
            deleted += usize::from(existed);
        }
        Ok(deleted)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let now_ms = self.clock.now_millis();
        state.evict_expired(now_ms);

        if state.strings.contains_key(key) {
            return Ok(false);
        }
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        state.strings.insert(
            key.to_string(),
            (value.to_string(), now_ms.saturating_add(ttl_ms)),
        );
        Ok(true)
    }
}
