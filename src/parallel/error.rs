use std::time::Duration;

use crate::subprocess::{ExitStatus, ProcessError};

/// Failure of a single unit of work submitted to a [`super::WorkerPool`].
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("command failed: {command}: {status}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("command failed: {command}: {source}")]
    Runner {
        command: String,
        #[source]
        source: ProcessError,
    },

    #[error("task execution timeout after {0:?}")]
    Timeout(Duration),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Message(String),
}

impl TaskError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// First failure of a provisioning run, located by group and 1-based step.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("parallel command group '{group}', command {step} failed: {source}")]
    Parallel {
        group: String,
        step: usize,
        #[source]
        source: TaskError,
    },

    #[error("sequential command group '{group}', command {step} failed: {source}")]
    Sequential {
        group: String,
        step: usize,
        #[source]
        source: TaskError,
    },
}

impl GroupError {
    pub fn group(&self) -> &str {
        match self {
            Self::Parallel { group, .. } | Self::Sequential { group, .. } => group,
        }
    }

    pub fn step(&self) -> usize {
        match self {
            Self::Parallel { step, .. } | Self::Sequential { step, .. } => *step,
        }
    }

    pub fn task_error(&self) -> &TaskError {
        match self {
            Self::Parallel { source, .. } | Self::Sequential { source, .. } => source,
        }
    }
}
