//! Box provisioning entry points
//!
//! [`Provisioner`] decides between grouped concurrent execution and plain
//! sequential execution based on [`EngineConfig::enable_parallel`], falls
//! back to a sequential rerun when a grouped run fails, and times each phase.

use std::sync::Arc;
use tracing::{info, warn};

use crate::parallel::{
    CommandGroup, EngineConfig, GroupError, PackageInventory, PackageQueryExecutor,
    PerformanceMonitor, ProgressObserver, SetupCommandExecutor, Task, TaskResults,
};
use crate::sandbox::{CommandRunner, DockerExecRunner};

/// Group name used when setup commands run one after another
pub const SEQUENTIAL_GROUP_NAME: &str = "Setup Commands";

const SETUP_OPERATION: &str = "Setup commands";
const QUERY_OPERATION: &str = "Package query";

pub struct Provisioner {
    setup_runner: Arc<dyn CommandRunner>,
    query_runner: Arc<dyn CommandRunner>,
    config: EngineConfig,
    progress: Option<Arc<dyn ProgressObserver>>,
    monitor: PerformanceMonitor,
}

impl Provisioner {
    pub fn new(
        setup_runner: Arc<dyn CommandRunner>,
        query_runner: Arc<dyn CommandRunner>,
        config: EngineConfig,
    ) -> Self {
        Self {
            setup_runner,
            query_runner,
            config,
            progress: None,
            monitor: PerformanceMonitor::new(),
        }
    }

    /// Provision through `docker exec`. Setup commands see the box's shell
    /// profile; inventory queries run without it.
    pub fn docker(config: EngineConfig) -> Self {
        Self::new(
            Arc::new(DockerExecRunner::production().sourcing_profile()),
            Arc::new(DockerExecRunner::production()),
            config,
        )
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Run setup commands in `box_name`.
    ///
    /// With concurrency enabled the commands are classified and run in
    /// groups; if that fails, every command is rerun sequentially in input
    /// order and only that second attempt's outcome is returned.
    pub async fn execute_setup_commands<S: AsRef<str>>(
        &mut self,
        box_name: &str,
        commands: &[S],
        show_output: bool,
    ) -> Result<(), GroupError> {
        if commands.is_empty() {
            return Ok(());
        }

        let executor = self.setup_executor(box_name, show_output);

        self.monitor.start(SETUP_OPERATION);
        let result = if self.config.enable_parallel {
            match executor.execute_parallel(commands).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    warn!(
                        "Parallel setup failed for '{}', falling back to sequential execution: {}",
                        box_name, err
                    );
                    run_sequential(&executor, commands).await
                }
            }
        } else {
            info!("Parallel execution disabled, running setup commands sequentially");
            run_sequential(&executor, commands).await
        };
        self.monitor.end(SETUP_OPERATION);

        result
    }

    /// Inventory installed packages in `box_name`. Never fails; ecosystems
    /// whose query failed map to an empty list.
    pub async fn query_packages(&mut self, box_name: &str) -> PackageInventory {
        let executor =
            PackageQueryExecutor::new(box_name, Arc::clone(&self.query_runner), &self.config);

        self.monitor.start(QUERY_OPERATION);
        let inventory = if self.config.enable_parallel {
            executor.query_all_packages().await
        } else {
            executor.query_all_sequential().await
        };
        self.monitor.end(QUERY_OPERATION);

        inventory
    }

    /// Run arbitrary tasks on the general pool, sized by `max_workers` and
    /// bounded by `task_timeout`.
    pub async fn execute_tasks(&self, tasks: Vec<Task>) -> TaskResults {
        self.config.general_pool().execute(tasks).await
    }

    fn setup_executor(&self, box_name: &str, show_output: bool) -> SetupCommandExecutor {
        let executor =
            SetupCommandExecutor::new(box_name, Arc::clone(&self.setup_runner), &self.config)
                .with_show_output(show_output);
        match &self.progress {
            Some(progress) => executor.with_progress(Arc::clone(progress)),
            None => executor,
        }
    }
}

async fn run_sequential<S: AsRef<str>>(
    executor: &SetupCommandExecutor,
    commands: &[S],
) -> Result<(), GroupError> {
    let group = CommandGroup::sequential(
        SEQUENTIAL_GROUP_NAME,
        commands
            .iter()
            .map(|command| command.as_ref().to_string())
            .collect(),
    );
    executor.execute_command_groups(&[group]).await
}
