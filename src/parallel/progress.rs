//! Per-command progress reporting for setup runs

use tracing::{debug, info};

/// One setup command about to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProgress {
    pub group: String,
    /// 1-based position within the group
    pub step: usize,
    pub total: usize,
    pub command: String,
}

/// Receives a [`StepProgress`] before each setup command runs.
///
/// Observers are called from worker tasks, possibly several at once.
pub trait ProgressObserver: Send + Sync {
    fn on_step(&self, progress: &StepProgress);
}

/// Reports steps through `tracing`: info level when output is shown,
/// debug otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress {
    pub show_output: bool,
}

impl ProgressObserver for TracingProgress {
    fn on_step(&self, progress: &StepProgress) {
        if self.show_output {
            info!(
                group = %progress.group,
                step = progress.step,
                total = progress.total,
                "[{}] Step {}/{}: {}",
                progress.group,
                progress.step,
                progress.total,
                progress.command
            );
        } else {
            debug!(
                group = %progress.group,
                step = progress.step,
                total = progress.total,
                "[{}] Step {}/{}: {}",
                progress.group,
                progress.step,
                progress.total,
                progress.command
            );
        }
    }
}
