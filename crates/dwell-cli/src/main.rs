//! dwell - delayed-task scheduler CLI.
//!
//! Usage:
//!   dwell run                                  # reload/refresh loops + article consumer
//!   dwell add --task-type 1001 --priority 1 --delay-secs 90 --params '{"article_id":7}'
//!   dwell cancel task-01HV...
//!   dwell poll --task-type 1001 --priority 1
//!   dwell log task-01HV...
//!   dwell status
//!
//! Backends: `DATABASE_PATH` selects the SQLite store and `REDIS_URL` the
//! Redis cache. Without them everything lives in process memory, which only
//! makes sense for `run`.

mod kinds;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use envconfig::Envconfig;
use tracing_subscriber::EnvFilter;

use dwell_core::app::{PollingConsumer, SchedulerLoops};
use dwell_core::impls::{
    CacheLeaseLock, InMemoryStagingCache, InMemoryTaskStore, RedisStagingCache, SqliteTaskStore,
};
use dwell_core::ports::{Clock, IdGenerator, StagingCache, SystemClock, TaskStore, UlidGenerator};
use dwell_core::typed::TypedRegistry;
use dwell_core::{NewTask, SchedulerConfig, TaskId, TaskManager};

use crate::kinds::{ArticlePublish, ArticlePublishHandler};

#[derive(Parser)]
#[command(name = "dwell", version, about = "Delayed-task scheduler")]
struct Cli {
    /// SQLite database file (in-memory store when absent)
    #[arg(long, env = "DATABASE_PATH", global = true)]
    database_path: Option<PathBuf>,

    /// Redis URL for the staging cache (in-memory cache when absent)
    #[arg(long, env = "REDIS_URL", global = true)]
    redis_url: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reload/refresh loops and the article consumer until Ctrl-C
    Run,
    /// Schedule a task
    Add {
        #[arg(long)]
        task_type: i32,
        #[arg(long)]
        priority: i32,
        /// Seconds from now; negative values are allowed
        #[arg(long, allow_hyphen_values = true, conflicts_with = "at")]
        delay_secs: Option<i64>,
        /// Absolute execute time (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Opaque parameters, stored as raw bytes
        #[arg(long, default_value = "")]
        params: String,
    },
    /// Cancel a scheduled task
    Cancel { task_id: TaskId },
    /// Take one due task of a partition
    Poll {
        #[arg(long)]
        task_type: i32,
        #[arg(long)]
        priority: i32,
    },
    /// Show a task's log record
    Log { task_id: TaskId },
    /// Show staging cache sizes per partition
    Status,
}

struct Backend {
    manager: Arc<TaskManager>,
    durable: bool,
}

async fn build_backend(cli: &Cli, config: SchedulerConfig) -> Result<Backend> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));

    let store: Arc<dyn TaskStore> = match &cli.database_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using sqlite task store");
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            Arc::new(SqliteTaskStore::open(path, ids.clone(), clock.clone())?)
        }
        None => {
            tracing::info!("using in-memory task store");
            Arc::new(InMemoryTaskStore::new(ids.clone(), clock.clone()))
        }
    };

    let cache: Arc<dyn StagingCache> = match &cli.redis_url {
        Some(url) => Arc::new(RedisStagingCache::connect(url).await?),
        None => {
            tracing::info!("using in-memory staging cache");
            Arc::new(InMemoryStagingCache::new(clock.clone()))
        }
    };

    let lease = Arc::new(CacheLeaseLock::new(cache.clone(), ids));
    let manager = TaskManager::new(store, cache, lease, clock, config);
    Ok(Backend {
        manager: Arc::new(manager),
        durable: cli.database_path.is_some() && cli.redis_url.is_some(),
    })
}

fn execute_time(delay_secs: Option<i64>, at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match (at, delay_secs) {
        (Some(at), _) => at,
        (None, Some(secs)) => Utc::now() + Duration::seconds(secs),
        (None, None) => Utc::now(),
    }
}

async fn run(manager: Arc<TaskManager>) -> Result<()> {
    let mut registry = TypedRegistry::new();
    registry.register::<ArticlePublish, _>(ArticlePublishHandler)?;

    let loops = SchedulerLoops::start(Arc::clone(&manager)).await;
    let consumer = PollingConsumer::spawn(Arc::clone(&manager), &registry);
    tracing::info!(partitions = ?registry.partitions(), "scheduler running; Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutting down");

    consumer.shutdown_and_join().await;
    loops.shutdown_and_join().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "dwell=debug" } else { "dwell=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = SchedulerConfig::init_from_env().context("reading DWELL_* configuration")?;
    tracing::debug!("configuration:\n{config}");

    let backend = build_backend(&cli, config).await?;
    if !backend.durable && !matches!(cli.command, Command::Run) {
        tracing::warn!("store or cache is in-memory; state is lost when this command exits");
    }
    let manager = backend.manager;

    match cli.command {
        Command::Run => run(manager).await?,
        Command::Add {
            task_type,
            priority,
            delay_secs,
            at,
            params,
        } => {
            let task = NewTask::new(task_type, priority, execute_time(delay_secs, at))
                .with_parameters(params.into_bytes());
            let task_id = manager.add_task(task).await?;
            println!("{task_id}");
        }
        Command::Cancel { task_id } => {
            if manager.cancel_task(task_id).await? {
                println!("cancelled {task_id}");
            } else {
                println!("{task_id} is not scheduled (unknown, executed or cancelled)");
            }
        }
        Command::Poll {
            task_type,
            priority,
        } => match manager.poll(task_type, priority).await {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => println!("nothing due"),
        },
        Command::Log { task_id } => match manager.task_log(task_id).await? {
            Some(log) => println!(
                "{task_id} status={:?} version={} type={} priority={} execute_time={} updated_at={}",
                log.status,
                log.version,
                log.task.task_type,
                log.task.priority,
                log.task.execute_time.to_rfc3339(),
                log.updated_at.to_rfc3339(),
            ),
            None => println!("no log record for {task_id}"),
        },
        Command::Status => {
            let counts = manager.staging_counts().await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }
    Ok(())
}
