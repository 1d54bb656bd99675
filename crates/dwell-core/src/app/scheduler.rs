//! SchedulerLoops - the periodic reload and refresh passes.
//!
//! - reload: once at startup (before `start` returns), then every
//!   `reload_interval`
//! - refresh: every `refresh_interval`, serialized across instances by the
//!   lease lock inside `TaskManager::refresh_due_tasks`
//!
//! A failed pass is logged and the loop waits for the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::task_manager::TaskManager;

/// Loop group handle.
/// - `request_shutdown()` stops both loops after their current pass
/// - `shutdown_and_join()` waits for them to exit
pub struct SchedulerLoops {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl SchedulerLoops {
    pub async fn start(manager: Arc<TaskManager>) -> Self {
        match manager.reload_data().await {
            Ok(staged) => tracing::info!(staged, "startup reload complete"),
            Err(err) => tracing::warn!(error = %err, "startup reload failed; retrying on schedule"),
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reload_every = manager.config().reload_interval();
        let refresh_every = manager.config().refresh_interval();

        let reload = {
            let manager = Arc::clone(&manager);
            let rx = shutdown_rx.clone();
            tokio::spawn(async move {
                run_every(reload_every, rx, "reload", || async {
                    manager.reload_data().await.map(|_| ())
                })
                .await;
            })
        };

        let refresh = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                run_every(refresh_every, shutdown_rx, "refresh", || async {
                    manager.refresh_due_tasks().await.map(|_| ())
                })
                .await;
            })
        };

        Self {
            shutdown_tx,
            joins: vec![reload, refresh],
        }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn run_every<F, Fut>(
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    pass: &'static str,
    mut run: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::domain::Result<()>>,
{
    // interval_at panics on a zero period
    let period = period.max(Duration::from_millis(10));
    // first tick one period out: startup work is done by `start`
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        if let Err(err) = run().await {
            tracing::warn!(pass, error = %err, "scheduler pass failed");
        }
    }
    tracing::debug!(pass, "scheduler loop stopped");
}
