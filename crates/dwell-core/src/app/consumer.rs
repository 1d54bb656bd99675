//! PollingConsumer - one poll loop per registered partition.
//!
//! Each loop drains its ready list, handing every task to the partition's
//! handler, then sleeps `poll_interval` before polling again. Delivery is
//! at-most-once: a task is `EXECUTED` before its handler runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::task_manager::TaskManager;
use crate::typed::{DynHandler, TypedRegistry};

pub struct PollingConsumer {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl PollingConsumer {
    pub fn spawn(manager: Arc<TaskManager>, registry: &TypedRegistry) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poll_interval = manager.config().poll_interval();

        let joins = registry
            .handlers()
            .map(|handler| {
                let manager = Arc::clone(&manager);
                let rx = shutdown_rx.clone();
                tokio::spawn(consume_loop(manager, handler, poll_interval, rx))
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

/// Poll one task of the handler's partition and run it.
/// Returns `false` when nothing was due.
pub async fn consume_once(manager: &TaskManager, handler: &dyn DynHandler) -> bool {
    let partition = handler.partition();
    let Some(task) = manager.poll_partition(partition).await else {
        return false;
    };

    match handler.handle_dyn(&task).await {
        Ok(()) => tracing::debug!(task_id = %task.task_id, %partition, "task handled"),
        Err(err) => {
            tracing::warn!(task_id = %task.task_id, %partition, error = %err, "handler failed");
        }
    }
    true
}

async fn consume_loop(
    manager: Arc<TaskManager>,
    handler: Arc<dyn DynHandler>,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        if consume_once(&manager, handler.as_ref()).await {
            continue;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    tracing::debug!(partition = %handler.partition(), "consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::domain::TaskStatus;
    use crate::impls::{CacheLeaseLock, InMemoryStagingCache, InMemoryTaskStore};
    use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};
    use crate::typed::handler::fixtures::{FailingHandler, RecordingHandler};
    use crate::typed::TaskKind;
    use crate::typed::task::fixtures::{PublishArticle, SendDigest};
    use chrono::Utc;

    fn manager() -> Arc<TaskManager> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));
        let store = Arc::new(InMemoryTaskStore::new(ids.clone(), clock.clone()));
        let cache = Arc::new(InMemoryStagingCache::new(clock.clone()));
        let lease = Arc::new(CacheLeaseLock::new(cache.clone(), ids));
        let config = SchedulerConfig {
            poll_interval_ms: 20,
            ..SchedulerConfig::default()
        };
        Arc::new(TaskManager::new(store, cache, lease, clock, config))
    }

    #[tokio::test]
    async fn consumer_runs_handlers_in_submission_order() {
        let manager = manager();
        let recording = RecordingHandler::default();
        let mut registry = TypedRegistry::new();
        registry
            .register::<PublishArticle, _>(recording.clone())
            .unwrap();

        for article_id in [3, 1, 2] {
            manager
                .submit(&PublishArticle { article_id }, Utc::now())
                .await
                .unwrap();
        }

        let consumer = PollingConsumer::spawn(Arc::clone(&manager), &registry);
        for _ in 0..50 {
            if recording.seen.lock().await.len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        consumer.shutdown_and_join().await;

        assert_eq!(*recording.seen.lock().await, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn failed_handler_still_consumes_the_task() {
        let manager = manager();
        let mut registry = TypedRegistry::new();
        registry.register::<SendDigest, _>(FailingHandler).unwrap();
        let handler = registry.get(SendDigest::partition()).unwrap();

        let task_id = manager
            .submit(&SendDigest { user: "ana".into() }, Utc::now())
            .await
            .unwrap();

        assert!(consume_once(&manager, handler.as_ref()).await);
        assert!(!consume_once(&manager, handler.as_ref()).await);

        let log = manager.task_log(task_id).await.unwrap().unwrap();
        assert_eq!(log.status, TaskStatus::Executed);
    }
}
