//! TaskManager - the scheduler's operations.
//!
//! # Flow
//! - add: store.create -> stage (ready list, future set, or nothing)
//! - cancel: store.complete(CANCELLED) -> remove staged payload
//! - poll: pop ready list tail -> decode -> store.complete(EXECUTED)
//! - reload: rebuild every staging structure from the store
//! - refresh: under the lease lock, migrate due future members to ready lists
//!
//! The store is always written first. The cache only ever holds tasks that
//! are durable, and every cache failure is healed by the next reload.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::status::{PartitionCounts, StagingCounts};
use crate::config::SchedulerConfig;
use crate::domain::{
    FUTURE_PREFIX, NewTask, PartitionKey, READY_PREFIX, Result, Task, TaskId, TaskLogRecord,
    TaskStatus,
};
use crate::ports::{CacheError, Clock, LeaseLock, StagingCache, TaskStore};
use crate::typed::{ParameterCodec, TaskKind};

/// Where the staging rule puts a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Due now: head of the ready list.
    Ready,
    /// Due within the horizon: future set, scored by execute time.
    Future,
    /// Beyond the horizon: not staged until a later reload.
    Deferred,
}

pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    cache: Arc<dyn StagingCache>,
    lease: Arc<dyn LeaseLock>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl TaskManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        cache: Arc<dyn StagingCache>,
        lease: Arc<dyn LeaseLock>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            lease,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn placement(&self, execute_time: DateTime<Utc>, now: DateTime<Utc>) -> Placement {
        if execute_time <= now {
            Placement::Ready
        } else if execute_time <= now + self.config.horizon() {
            Placement::Future
        } else {
            Placement::Deferred
        }
    }

    /// Persist a task and stage it. Returns the store-assigned id.
    ///
    /// A staging failure does not fail the call: the task is durable and the
    /// next reload stages it.
    pub async fn add_task(&self, task: NewTask) -> Result<TaskId> {
        let task = self.store.create(task).await?;
        let task_id = task.task_id;

        match self.stage(&task, self.clock.now()).await {
            Ok(placement) => {
                debug!(%task_id, partition = %task.partition(), ?placement, "task added");
            }
            Err(err) => {
                warn!(%task_id, error = %err, "task persisted but not staged; next reload restages it");
            }
        }
        Ok(task_id)
    }

    /// Encode typed parameters and add the task to the kind's partition.
    pub async fn submit<K: TaskKind>(
        &self,
        params: &K,
        execute_time: DateTime<Utc>,
    ) -> Result<TaskId> {
        let parameters = ParameterCodec::encode(params)?;
        self.add_task(
            NewTask::new(K::TASK_TYPE, K::PRIORITY, execute_time).with_parameters(parameters),
        )
        .await
    }

    /// Cancel a scheduled task.
    ///
    /// `Ok(false)` when the task is unknown or already terminal (polled or
    /// cancelled). Staged copies are removed best effort.
    pub async fn cancel_task(&self, task_id: TaskId) -> Result<bool> {
        let Some(log) = self.store.complete(task_id, TaskStatus::Cancelled).await? else {
            debug!(%task_id, "cancel refused: task is not scheduled");
            return Ok(false);
        };

        self.unstage(&log.task).await;
        info!(%task_id, "task cancelled");
        Ok(true)
    }

    /// Take the oldest due task of a partition.
    ///
    /// `None` means nothing is due. Failures also yield `None`; they are
    /// logged and leave the task recoverable by the next reload.
    pub async fn poll(&self, task_type: i32, priority: i32) -> Option<Task> {
        self.poll_partition(PartitionKey::new(task_type, priority))
            .await
    }

    pub async fn poll_partition(&self, partition: PartitionKey) -> Option<Task> {
        let popped = self
            .cache_call(self.cache.pop_ready(&partition.ready_key()))
            .await;
        let payload = match popped {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                warn!(%partition, error = %err, "poll failed: ready list unavailable");
                return None;
            }
        };

        let task = match Task::decode(&payload) {
            Ok(task) => task,
            Err(err) => {
                error!(%partition, error = %err, "dropping undecodable staged payload");
                return None;
            }
        };

        match self.store.complete(task.task_id, TaskStatus::Executed).await {
            Ok(Some(_)) => {
                debug!(task_id = %task.task_id, %partition, "task delivered");
                Some(task)
            }
            Ok(None) => {
                // cancelled, or delivered by another instance after a reload raced a pop
                debug!(task_id = %task.task_id, "dropping staged task that is no longer scheduled");
                None
            }
            Err(err) => {
                warn!(task_id = %task.task_id, error = %err, "poll failed: could not mark task executed");
                None
            }
        }
    }

    /// Rebuild the staging cache from the store.
    ///
    /// Returns how many tasks were staged. Safe to run concurrently with
    /// itself and on every instance.
    ///
    /// The cache is cleared before the store is read: a task added in
    /// between is then at worst staged twice, and `poll` drops the second
    /// copy once the first is `EXECUTED`.
    pub async fn reload_data(&self) -> Result<usize> {
        let mut keys = self
            .cache_call(self.cache.scan(&format!("{READY_PREFIX}*")))
            .await?;
        keys.extend(
            self.cache_call(self.cache.scan(&format!("{FUTURE_PREFIX}*")))
                .await?,
        );
        let cleared = self.cache_call(self.cache.delete(&keys)).await?;

        let now = self.clock.now();
        let tasks = self.store.list_due_before(now + self.config.horizon()).await?;

        let mut staged = 0;
        for task in &tasks {
            match self.stage(task, now).await {
                Ok(Placement::Deferred) => {}
                Ok(_) => staged += 1,
                Err(err) => {
                    warn!(task_id = %task.task_id, error = %err, "restaging failed");
                }
            }
        }

        info!(cleared, staged, "staging cache reloaded");
        Ok(staged)
    }

    /// Move every future-set member that is due into its ready list.
    ///
    /// Returns how many tasks were moved; `0` when another instance holds
    /// the lease.
    pub async fn refresh_due_tasks(&self) -> Result<usize> {
        let lock_name = self.config.lock_name.as_str();
        let acquired = self
            .cache_call(self.lease.try_acquire(lock_name, self.config.lock_ttl()))
            .await?;
        let Some(lease) = acquired else {
            debug!(lock = lock_name, "refresh skipped: lease held elsewhere");
            return Ok(0);
        };

        let future_keys = self
            .cache_call(self.cache.scan(&format!("{FUTURE_PREFIX}*")))
            .await?;
        let now_ms = self.clock.now_millis();

        let mut moved = 0;
        for future_key in future_keys {
            let Some(partition) = PartitionKey::from_future_key(&future_key) else {
                warn!(key = %future_key, "skipping future set with malformed partition");
                continue;
            };
            let migrated = self
                .cache_call(
                    self.cache
                        .migrate_due(&future_key, &partition.ready_key(), now_ms),
                )
                .await;
            match migrated {
                Ok(0) => {}
                Ok(count) => {
                    debug!(%partition, moved = count, "due tasks migrated");
                    moved += count;
                }
                Err(err) => warn!(%partition, error = %err, "migration failed"),
            }
        }

        if moved > 0 {
            info!(moved, %lease, "refresh pass complete");
        }
        Ok(moved)
    }

    pub async fn task_log(&self, task_id: TaskId) -> Result<Option<TaskLogRecord>> {
        Ok(self.store.get_log(task_id).await?)
    }

    pub async fn staging_counts(&self) -> Result<StagingCounts> {
        let mut counts: BTreeMap<PartitionKey, (usize, usize)> = BTreeMap::new();

        let ready_keys = self
            .cache_call(self.cache.scan(&format!("{READY_PREFIX}*")))
            .await?;
        for key in ready_keys {
            if let Some(partition) = PartitionKey::from_ready_key(&key) {
                counts.entry(partition).or_default().0 =
                    self.cache_call(self.cache.ready_len(&key)).await?;
            }
        }

        let future_keys = self
            .cache_call(self.cache.scan(&format!("{FUTURE_PREFIX}*")))
            .await?;
        for key in future_keys {
            if let Some(partition) = PartitionKey::from_future_key(&key) {
                counts.entry(partition).or_default().1 =
                    self.cache_call(self.cache.future_len(&key)).await?;
            }
        }

        Ok(StagingCounts {
            partitions: counts
                .into_iter()
                .map(|(partition, (ready, future))| PartitionCounts {
                    task_type: partition.task_type,
                    priority: partition.priority,
                    ready,
                    future,
                })
                .collect(),
        })
    }

    async fn stage(&self, task: &Task, now: DateTime<Utc>) -> Result<Placement> {
        let placement = self.placement(task.execute_time, now);
        let partition = task.partition();
        match placement {
            Placement::Ready => {
                let payload = task.encode()?;
                self.cache_call(self.cache.push_ready(&partition.ready_key(), &payload))
                    .await?;
            }
            Placement::Future => {
                let payload = task.encode()?;
                self.cache_call(self.cache.add_future(
                    &partition.future_key(),
                    &payload,
                    task.score(),
                ))
                .await?;
            }
            Placement::Deferred => {}
        }
        Ok(placement)
    }

    /// Remove a task's staged copy. Looks where the staging rule would have
    /// put it first and falls back to the other structure, since a due task
    /// stays in its future set until the next migration.
    async fn unstage(&self, task: &Task) {
        let payload = match task.encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(task_id = %task.task_id, error = %err, "cannot encode task for removal");
                return;
            }
        };
        let partition = task.partition();
        let (first, second) = if task.execute_time <= self.clock.now() {
            (Placement::Ready, Placement::Future)
        } else {
            (Placement::Future, Placement::Ready)
        };

        if self.remove_staged(first, partition, &payload, task.task_id).await == 0 {
            self.remove_staged(second, partition, &payload, task.task_id)
                .await;
        }
    }

    async fn remove_staged(
        &self,
        from: Placement,
        partition: PartitionKey,
        payload: &str,
        task_id: TaskId,
    ) -> usize {
        let removed = match from {
            Placement::Ready => {
                self.cache_call(self.cache.remove_ready(&partition.ready_key(), payload))
                    .await
            }
            Placement::Future => {
                self.cache_call(self.cache.remove_future(&partition.future_key(), payload))
                    .await
            }
            Placement::Deferred => Ok(0),
        };
        removed.unwrap_or_else(|err| {
            warn!(%task_id, %partition, error = %err, "failed to remove staged copy");
            0
        })
    }

    /// Bound a cache call by the configured timeout.
    async fn cache_call<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let limit = self.config.cache_timeout();
        tokio::time::timeout(limit, op)
            .await
            .unwrap_or(Err(CacheError::Timeout(limit)))
    }
}
