use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use dwell_core::config::SchedulerConfig;
use dwell_core::domain::{NewTask, SchedulerError, TaskStatus};
use dwell_core::impls::{CacheLeaseLock, InMemoryStagingCache, InMemoryTaskStore, SqliteTaskStore};
use dwell_core::ports::{Clock, IdGenerator, ManualClock, StagingCache, TaskStore, UlidGenerator};
use dwell_core::TaskManager;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

struct World {
    clock: ManualClock,
    ids: Arc<dyn IdGenerator>,
    store: Arc<InMemoryTaskStore>,
    cache: Arc<InMemoryStagingCache>,
}

impl World {
    fn new() -> Self {
        let clock = ManualClock::new(start_time());
        let clock_dyn: Arc<dyn Clock> = Arc::new(clock.clone());
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock_dyn.clone()));
        Self {
            store: Arc::new(InMemoryTaskStore::new(ids.clone(), clock_dyn.clone())),
            cache: Arc::new(InMemoryStagingCache::new(clock_dyn)),
            clock,
            ids,
        }
    }

    /// A scheduler instance; several instances can share one world.
    fn manager(&self) -> TaskManager {
        let clock: Arc<dyn Clock> = Arc::new(self.clock.clone());
        let lease = Arc::new(CacheLeaseLock::new(self.cache.clone(), self.ids.clone()));
        TaskManager::new(
            self.store.clone(),
            self.cache.clone(),
            lease,
            clock,
            SchedulerConfig::default(),
        )
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[tokio::test]
async fn due_tasks_are_polled_in_submission_order() {
    let world = World::new();
    let manager = world.manager();
    let now = world.now();

    let mut submitted = Vec::new();
    for n in 0..4u8 {
        let task = NewTask::new(1, 5, now - Duration::seconds(1)).with_parameters(vec![n]);
        submitted.push(manager.add_task(task).await.unwrap());
    }
    // another partition does not interfere
    manager.add_task(NewTask::new(1, 6, now)).await.unwrap();

    let mut polled = Vec::new();
    while let Some(task) = manager.poll(1, 5).await {
        polled.push(task.task_id);
    }
    assert_eq!(polled, submitted);
    assert!(manager.poll(1, 6).await.is_some());
}

#[tokio::test]
async fn task_beyond_horizon_waits_for_reload_and_migration() {
    let world = World::new();
    let manager = world.manager();
    let t0 = world.now();

    let immediate = manager
        .add_task(NewTask::new(1, 5, t0 - Duration::milliseconds(1000)))
        .await
        .unwrap();
    let delayed = manager
        .add_task(NewTask::new(2, 1, t0 + Duration::milliseconds(600_000)))
        .await
        .unwrap();

    assert_eq!(manager.poll(1, 5).await.unwrap().task_id, immediate);
    assert!(manager.poll(2, 1).await.is_none());

    // a reload before the task enters the horizon stages nothing
    world.clock.advance(Duration::minutes(4));
    manager.reload_data().await.unwrap();
    assert_eq!(manager.staging_counts().await.unwrap().future_total(), 0);

    world.clock.set(t0 + Duration::milliseconds(300_001));
    manager.reload_data().await.unwrap();
    assert_eq!(manager.staging_counts().await.unwrap().future_total(), 1);
    assert_eq!(manager.refresh_due_tasks().await.unwrap(), 0);
    assert!(manager.poll(2, 1).await.is_none());

    world.clock.set(t0 + Duration::milliseconds(600_001));
    assert_eq!(manager.refresh_due_tasks().await.unwrap(), 1);
    assert_eq!(manager.poll(2, 1).await.unwrap().task_id, delayed);

    let log = manager.task_log(delayed).await.unwrap().unwrap();
    assert_eq!(log.status, TaskStatus::Executed);
    assert_eq!(log.version, 2);
}

#[tokio::test]
async fn reload_twice_yields_the_same_staged_set() {
    let world = World::new();
    let manager = world.manager();
    let now = world.now();

    for offset in [-30, 0, 45, 120, 240, 900] {
        manager
            .add_task(NewTask::new(3, 1, now + Duration::seconds(offset)))
            .await
            .unwrap();
    }

    manager.reload_data().await.unwrap();
    let first_counts = manager.staging_counts().await.unwrap();
    let first_ready = world.cache.ready_snapshot("READY:3_1").await;
    let first_future = world
        .cache
        .range_future("FUTURE:3_1", 0, i64::MAX)
        .await
        .unwrap();

    manager.reload_data().await.unwrap();
    assert_eq!(manager.staging_counts().await.unwrap(), first_counts);
    assert_eq!(world.cache.ready_snapshot("READY:3_1").await, first_ready);
    assert_eq!(
        world.cache.range_future("FUTURE:3_1", 0, i64::MAX).await.unwrap(),
        first_future
    );

    assert_eq!(first_counts.ready_total(), 2);
    assert_eq!(first_counts.future_total(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumers_receive_each_task_once() {
    let world = World::new();
    let manager = Arc::new(world.manager());
    let now = world.now();

    let mut submitted = HashSet::new();
    for _ in 0..5 {
        submitted.insert(manager.add_task(NewTask::new(7, 1, now)).await.unwrap());
    }

    let mut consumers = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        consumers.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(task) = manager.poll(7, 1).await {
                got.push(task.task_id);
            }
            got
        }));
    }

    let mut received = Vec::new();
    for consumer in consumers {
        received.extend(consumer.await.unwrap());
    }
    assert_eq!(received.len(), 5);
    assert_eq!(received.into_iter().collect::<HashSet<_>>(), submitted);
}

#[tokio::test]
async fn cancelled_task_is_never_delivered() {
    let world = World::new();
    let manager = world.manager();
    let task_id = manager
        .add_task(NewTask::new(1, 1, world.now() + Duration::minutes(1)))
        .await
        .unwrap();

    assert!(manager.cancel_task(task_id).await.unwrap());

    world.clock.advance(Duration::minutes(2));
    manager.refresh_due_tasks().await.unwrap();
    assert!(manager.poll(1, 1).await.is_none());
    manager.reload_data().await.unwrap();
    assert!(manager.poll(1, 1).await.is_none());

    let log = manager.task_log(task_id).await.unwrap().unwrap();
    assert_eq!(log.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn cancel_after_poll_is_too_late() {
    let world = World::new();
    let manager = world.manager();
    let task_id = manager
        .add_task(NewTask::new(1, 1, world.now()))
        .await
        .unwrap();

    assert!(manager.poll(1, 1).await.is_some());
    assert!(!manager.cancel_task(task_id).await.unwrap());

    let log = manager.task_log(task_id).await.unwrap().unwrap();
    assert_eq!(log.status, TaskStatus::Executed);
    assert_eq!(log.version, 2);
}

#[tokio::test]
async fn persistence_failure_stages_nothing() {
    let world = World::new();
    let manager = world.manager();

    world.store.set_unavailable(true);
    let err = manager
        .add_task(NewTask::new(1, 1, world.now()))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Persistence(_)));
    world.store.set_unavailable(false);

    assert!(manager.staging_counts().await.unwrap().partitions.is_empty());
    assert!(manager.poll(1, 1).await.is_none());
}

#[tokio::test]
async fn task_added_during_cache_outage_is_restaged_by_reload() {
    let world = World::new();
    let manager = world.manager();

    world.cache.set_unavailable(true);
    let task_id = manager
        .add_task(NewTask::new(1, 1, world.now()))
        .await
        .unwrap();
    world.cache.set_unavailable(false);

    assert!(manager.poll(1, 1).await.is_none());
    assert_eq!(manager.reload_data().await.unwrap(), 1);
    assert_eq!(manager.poll(1, 1).await.unwrap().task_id, task_id);
}

#[tokio::test]
async fn only_the_lease_holder_migrates() {
    let world = World::new();
    let first = world.manager();
    let second = world.manager();

    first
        .add_task(NewTask::new(1, 1, world.now() + Duration::seconds(10)))
        .await
        .unwrap();
    world.clock.advance(Duration::seconds(11));
    assert_eq!(first.refresh_due_tasks().await.unwrap(), 1);

    second
        .add_task(NewTask::new(1, 1, world.now() + Duration::seconds(5)))
        .await
        .unwrap();
    world.clock.advance(Duration::seconds(6));
    assert_eq!(second.refresh_due_tasks().await.unwrap(), 0);

    // the first holder's lease lapses after its TTL
    world.clock.advance(Duration::seconds(25));
    assert_eq!(second.refresh_due_tasks().await.unwrap(), 1);
    assert_eq!(world.cache.ready_len("READY:1_1").await.unwrap(), 2);
}

#[tokio::test]
async fn sqlite_backed_scheduler_survives_losing_its_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dwell.db");
    let clock = ManualClock::new(start_time());
    let clock_dyn: Arc<dyn Clock> = Arc::new(clock.clone());
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock_dyn.clone()));

    let build = || -> TaskManager {
        let store: Arc<dyn TaskStore> =
            Arc::new(SqliteTaskStore::open(&path, ids.clone(), clock_dyn.clone()).unwrap());
        let cache: Arc<dyn StagingCache> = Arc::new(InMemoryStagingCache::new(clock_dyn.clone()));
        let lease = Arc::new(CacheLeaseLock::new(cache.clone(), ids.clone()));
        TaskManager::new(store, cache, lease, clock_dyn.clone(), SchedulerConfig::default())
    };

    let task_id = {
        let manager = build();
        manager
            .add_task(NewTask::new(4, 2, clock.now()).with_parameters(b"payload".to_vec()))
            .await
            .unwrap()
    };

    // fresh process: empty cache, same database
    let manager = build();
    assert!(manager.poll(4, 2).await.is_none());
    manager.reload_data().await.unwrap();

    let task = manager.poll(4, 2).await.unwrap();
    assert_eq!(task.task_id, task_id);
    assert_eq!(task.parameters, b"payload");
    assert_eq!(
        manager.task_log(task_id).await.unwrap().unwrap().status,
        TaskStatus::Executed
    );
}
