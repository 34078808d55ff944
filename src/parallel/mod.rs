//! Concurrent command execution for box provisioning
//!
//! A bounded [`WorkerPool`] runs boxed futures under a single deadline and
//! reports results in submission order. Setup commands are classified into
//! groups ([`categorize_commands`]) so that only commands touching
//! independent package namespaces run at the same time, and package
//! inventory queries run side by side on their own pool.

pub mod config;
pub mod error;
pub mod monitor;
pub mod pool;
pub mod progress;
pub mod query;
pub mod setup;

pub use config::EngineConfig;
pub use error::{GroupError, TaskError};
pub use monitor::PerformanceMonitor;
pub use pool::{Batch, StringTask, Task, TaskResults, WorkerPool};
pub use progress::{ProgressObserver, StepProgress, TracingProgress};
pub use query::{
    Ecosystem, PackageInventory, PackageQuery, PackageQueryExecutor, PACKAGE_QUERIES,
};
pub use setup::{categorize_commands, CommandCategory, CommandGroup, SetupCommandExecutor};
