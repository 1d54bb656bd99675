use envconfig::Envconfig;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Scheduler tuning, read from `DWELL_*` environment variables.
#[derive(Envconfig, Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How far ahead of now tasks are staged into future sets.
    #[envconfig(from = "DWELL_HORIZON_SECS", default = "300")]
    pub horizon_secs: u64,
    #[envconfig(from = "DWELL_RELOAD_INTERVAL_SECS", default = "300")]
    pub reload_interval_secs: u64,
    #[envconfig(from = "DWELL_REFRESH_INTERVAL_SECS", default = "60")]
    pub refresh_interval_secs: u64,
    #[envconfig(from = "DWELL_LOCK_NAME", default = "FUTURE_TASK_SYNC")]
    pub lock_name: String,
    #[envconfig(from = "DWELL_LOCK_TTL_SECS", default = "30")]
    pub lock_ttl_secs: u64,
    #[envconfig(from = "DWELL_POLL_INTERVAL_MS", default = "1000")]
    pub poll_interval_ms: u64,
    #[envconfig(from = "DWELL_CACHE_TIMEOUT_MS", default = "2000")]
    pub cache_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon_secs: 300,
            reload_interval_secs: 300,
            refresh_interval_secs: 60,
            lock_name: "FUTURE_TASK_SYNC".to_string(),
            lock_ttl_secs: 30,
            poll_interval_ms: 1000,
            cache_timeout_ms: 2000,
        }
    }
}

impl SchedulerConfig {
    pub fn horizon(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.horizon_secs).unwrap_or(i64::MAX / 1000))
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}

impl Display for SchedulerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "DWELL_HORIZON_SECS: {}", self.horizon_secs)?;
        writeln!(f, "DWELL_RELOAD_INTERVAL_SECS: {}", self.reload_interval_secs)?;
        writeln!(f, "DWELL_REFRESH_INTERVAL_SECS: {}", self.refresh_interval_secs)?;
        writeln!(f, "DWELL_LOCK_NAME: {}", self.lock_name)?;
        writeln!(f, "DWELL_LOCK_TTL_SECS: {}", self.lock_ttl_secs)?;
        writeln!(f, "DWELL_POLL_INTERVAL_MS: {}", self.poll_interval_ms)?;
        write!(f, "DWELL_CACHE_TIMEOUT_MS: {}", self.cache_timeout_ms)
    }
}
