//! The command-runner seam between the engine and the box runtime
//!
//! The engine never talks to docker directly. Everything it needs from a box
//! is [`CommandRunner::run`]: execute one shell command string against a
//! named environment and report its output and exit status.

use async_trait::async_trait;

use crate::subprocess::{ProcessCommandBuilder, ProcessError, ProcessOutput, SubprocessManager};

/// Prefix that loads the box's interactive profile before a setup command,
/// so tools installed by earlier steps (nvm, pyenv, ...) are on `PATH`.
pub const PROFILE_PREAMBLE: &str = ". /root/.bashrc >/dev/null 2>&1 || true; ";

/// Runs a command string inside an environment.
///
/// A command that runs but exits unsuccessfully is reported as `Ok` with a
/// failing [`crate::subprocess::ExitStatus`]. `Err` is reserved for commands
/// that could not be run at all.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, environment: &str, command: &str) -> Result<ProcessOutput, ProcessError>;
}

/// Executes commands in a running container through `docker exec`.
#[derive(Clone)]
pub struct DockerExecRunner {
    subprocess: SubprocessManager,
    source_profile: bool,
}

impl DockerExecRunner {
    pub fn new(subprocess: SubprocessManager) -> Self {
        Self {
            subprocess,
            source_profile: false,
        }
    }

    pub fn production() -> Self {
        Self::new(SubprocessManager::production())
    }

    /// Prefix every command with [`PROFILE_PREAMBLE`]
    pub fn sourcing_profile(mut self) -> Self {
        self.source_profile = true;
        self
    }

    fn script(&self, command: &str) -> String {
        if self.source_profile {
            format!("{PROFILE_PREAMBLE}{command}")
        } else {
            command.to_string()
        }
    }
}

#[async_trait]
impl CommandRunner for DockerExecRunner {
    async fn run(&self, environment: &str, command: &str) -> Result<ProcessOutput, ProcessError> {
        let process = ProcessCommandBuilder::docker_exec(environment)
            .bash_script(&self.script(command))
            .build();
        self.subprocess.runner().run(process).await
    }
}
