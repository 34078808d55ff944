use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::pool::WorkerPool;

pub const ENV_DISABLE_PARALLEL: &str = "DEVBOX_DISABLE_PARALLEL";
pub const ENV_MAX_WORKERS: &str = "DEVBOX_MAX_WORKERS";
pub const ENV_SETUP_WORKERS: &str = "DEVBOX_SETUP_WORKERS";
pub const ENV_QUERY_WORKERS: &str = "DEVBOX_QUERY_WORKERS";

/// Sizing and deadlines for every worker pool built during one run.
///
/// Built once at startup and handed to executors by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run classified command groups concurrently. When false, setup commands
    /// and package queries run one at a time.
    #[serde(default = "default_enable_parallel")]
    pub enable_parallel: bool,

    /// Size of the general pool used for ad-hoc task lists
    /// ([`crate::provision::Provisioner::execute_tasks`]). Setup commands and
    /// package queries use their own pools below.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_task_timeout", with = "humantime_serde")]
    pub task_timeout: Duration,

    #[serde(default = "default_setup_command_workers")]
    pub setup_command_workers: usize,

    #[serde(default = "default_setup_timeout", with = "humantime_serde")]
    pub setup_timeout: Duration,

    #[serde(default = "default_package_query_workers")]
    pub package_query_workers: usize,

    #[serde(default = "default_query_timeout", with = "humantime_serde")]
    pub query_timeout: Duration,
}

fn default_enable_parallel() -> bool {
    true
}

fn default_max_workers() -> usize {
    4
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_setup_command_workers() -> usize {
    3
}

fn default_setup_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_package_query_workers() -> usize {
    5
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(2 * 60)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_parallel: default_enable_parallel(),
            max_workers: default_max_workers(),
            task_timeout: default_task_timeout(),
            setup_command_workers: default_setup_command_workers(),
            setup_timeout: default_setup_timeout(),
            package_query_workers: default_package_query_workers(),
            query_timeout: default_query_timeout(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the process environment.
    pub fn load() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`. Worker counts that are not
    /// positive integers are ignored.
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_DISABLE_PARALLEL) {
            if value.trim().eq_ignore_ascii_case("true") {
                config.enable_parallel = false;
            }
        }

        if let Some(workers) = positive_override(&lookup, ENV_MAX_WORKERS) {
            config.max_workers = workers;
        }
        if let Some(workers) = positive_override(&lookup, ENV_SETUP_WORKERS) {
            config.setup_command_workers = workers;
        }
        if let Some(workers) = positive_override(&lookup, ENV_QUERY_WORKERS) {
            config.package_query_workers = workers;
        }

        config
    }

    pub fn general_pool(&self) -> WorkerPool {
        WorkerPool::new(self.max_workers, self.task_timeout)
    }

    pub fn setup_pool(&self) -> WorkerPool {
        WorkerPool::new(self.setup_command_workers, self.setup_timeout)
    }

    pub fn query_pool(&self) -> WorkerPool {
        WorkerPool::new(self.package_query_workers, self.query_timeout)
    }
}

fn positive_override<F>(lookup: &F, key: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            debug!("Ignoring {}={:?}: not a positive integer", key, raw);
            None
        }
    }
}
