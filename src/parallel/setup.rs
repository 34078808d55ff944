//! Setup command classification and grouped execution
//!
//! System tools and the OS package manager mutate shared state (service
//! manager, dpkg lock) and always run one command at a time. Language package
//! managers work in separate namespaces, so their groups run as concurrent
//! batches on the worker pool.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::error::{GroupError, TaskError};
use super::pool::{Batch, Task, WorkerPool};
use super::progress::{ProgressObserver, StepProgress, TracingProgress};
use crate::sandbox::CommandRunner;

/// Category of a setup command, in execution-plan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandCategory {
    System,
    Apt,
    Python,
    Npm,
    Yarn,
    Pnpm,
    Other,
}

impl CommandCategory {
    /// Every category in the order its group is emitted
    pub const ALL: [CommandCategory; 7] = [
        CommandCategory::System,
        CommandCategory::Apt,
        CommandCategory::Python,
        CommandCategory::Npm,
        CommandCategory::Yarn,
        CommandCategory::Pnpm,
        CommandCategory::Other,
    ];

    /// Classify by the command's leading program name, ignoring case.
    pub fn classify(command: &str) -> Self {
        let lowered = command.trim().to_ascii_lowercase();
        let mut tokens = lowered.split_whitespace();
        let Some(program) = tokens.next() else {
            return CommandCategory::Other;
        };

        match program {
            "systemctl" | "service" | "update-alternatives" | "adduser" | "usermod" => {
                CommandCategory::System
            }
            "apt" | "apt-get" => CommandCategory::Apt,
            "pip" | "pip3" => CommandCategory::Python,
            "python" | "python3" => {
                if tokens.next() == Some("-m") && tokens.next() == Some("pip") {
                    CommandCategory::Python
                } else {
                    CommandCategory::Other
                }
            }
            "npm" => CommandCategory::Npm,
            "yarn" => CommandCategory::Yarn,
            "pnpm" => CommandCategory::Pnpm,
            _ => CommandCategory::Other,
        }
    }

    pub fn group_name(&self) -> &'static str {
        match self {
            CommandCategory::System => "System Commands",
            CommandCategory::Apt => "APT Packages",
            CommandCategory::Python => "Python Packages",
            CommandCategory::Npm => "NPM Packages",
            CommandCategory::Yarn => "Yarn Packages",
            CommandCategory::Pnpm => "PNPM Packages",
            CommandCategory::Other => "Other Commands",
        }
    }

    /// Whether commands in this category may run alongside other groups.
    pub fn is_parallel(&self) -> bool {
        matches!(
            self,
            CommandCategory::Python
                | CommandCategory::Npm
                | CommandCategory::Yarn
                | CommandCategory::Pnpm
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGroup {
    pub name: String,
    pub commands: Vec<String>,
    pub parallel: bool,
}

impl CommandGroup {
    pub fn sequential(name: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            name: name.into(),
            commands,
            parallel: false,
        }
    }

    pub fn parallel(name: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            name: name.into(),
            commands,
            parallel: true,
        }
    }
}

/// Partition commands into ordered groups: system, apt, then the language
/// package managers (python, npm, yarn, pnpm), then everything else. Input
/// order is kept within a group and empty groups are omitted.
pub fn categorize_commands<S: AsRef<str>>(commands: &[S]) -> Vec<CommandGroup> {
    CommandCategory::ALL
        .iter()
        .filter_map(|category| {
            let members: Vec<String> = commands
                .iter()
                .map(|command| command.as_ref())
                .filter(|command| CommandCategory::classify(command) == *category)
                .map(str::to_string)
                .collect();

            if members.is_empty() {
                None
            } else {
                Some(CommandGroup {
                    name: category.group_name().to_string(),
                    commands: members,
                    parallel: category.is_parallel(),
                })
            }
        })
        .collect()
}

/// Runs setup commands for one box, grouped for safe concurrency.
#[derive(Clone)]
pub struct SetupCommandExecutor {
    box_name: String,
    runner: Arc<dyn CommandRunner>,
    worker_pool: WorkerPool,
    show_output: bool,
    progress: Option<Arc<dyn ProgressObserver>>,
}

impl SetupCommandExecutor {
    pub fn new(
        box_name: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            box_name: box_name.into(),
            runner,
            worker_pool: config.setup_pool(),
            show_output: false,
            progress: None,
        }
    }

    /// Echo command output. Unless an observer was set with
    /// [`Self::with_progress`], progress is also logged at info level.
    pub fn with_show_output(mut self, show_output: bool) -> Self {
        self.show_output = show_output;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn box_name(&self) -> &str {
        &self.box_name
    }

    /// Classify `commands` and run the resulting groups.
    pub async fn execute_parallel<S: AsRef<str>>(&self, commands: &[S]) -> Result<(), GroupError> {
        if commands.is_empty() {
            return Ok(());
        }
        let groups = categorize_commands(commands);
        self.execute_command_groups(&groups).await
    }

    /// Run all parallel groups as concurrent batches and wait for every one
    /// of them, then run the sequential groups in order. Stops at the first
    /// failure: a failed parallel batch prevents any sequential group from
    /// running, and a failed sequential command skips the rest.
    pub async fn execute_command_groups(&self, groups: &[CommandGroup]) -> Result<(), GroupError> {
        if groups.is_empty() {
            return Ok(());
        }

        let (parallel, sequential): (Vec<&CommandGroup>, Vec<&CommandGroup>) =
            groups.iter().partition(|group| group.parallel);

        if !parallel.is_empty() {
            self.run_parallel_groups(&parallel).await?;
        }

        for group in sequential {
            self.run_sequential_group(group).await?;
        }

        Ok(())
    }

    async fn run_parallel_groups(&self, groups: &[&CommandGroup]) -> Result<(), GroupError> {
        let groups = merge_by_name(groups);
        self.announce(format!(
            "Executing {} parallel command groups...",
            groups.len()
        ));

        let batches = groups
            .iter()
            .map(|group| Batch::new(group.name.clone(), self.group_tasks(group)))
            .collect();
        let mut batch_results = self.worker_pool.execute_batches(batches).await;

        for group in &groups {
            let Some(results) = batch_results.remove(&group.name) else {
                return Err(GroupError::Parallel {
                    group: group.name.clone(),
                    step: 0,
                    source: TaskError::message(format!(
                        "no results reported for group '{}'",
                        group.name
                    )),
                });
            };
            if let Some((index, err)) = results
                .into_iter()
                .enumerate()
                .find_map(|(i, result)| result.err().map(|err| (i, err)))
            {
                return Err(GroupError::Parallel {
                    group: group.name.clone(),
                    step: index + 1,
                    source: err,
                });
            }
        }

        self.announce("All parallel command groups completed successfully!".to_string());
        Ok(())
    }

    async fn run_sequential_group(&self, group: &CommandGroup) -> Result<(), GroupError> {
        self.announce(format!("Executing sequential group: {}", group.name));

        let total = group.commands.len();
        let progress = self.observer();
        for (i, command) in group.commands.iter().enumerate() {
            let step = StepProgress {
                group: group.name.clone(),
                step: i + 1,
                total,
                command: command.clone(),
            };
            run_step(
                Arc::clone(&self.runner),
                &self.box_name,
                step,
                self.show_output,
                progress.as_ref(),
            )
            .await
            .map_err(|source| GroupError::Sequential {
                group: group.name.clone(),
                step: i + 1,
                source,
            })?;
        }

        self.announce(format!(
            "Sequential group '{}' completed successfully!",
            group.name
        ));
        Ok(())
    }

    fn group_tasks(&self, group: &CommandGroup) -> Vec<Task> {
        let total = group.commands.len();
        let observer = self.observer();
        group
            .commands
            .iter()
            .enumerate()
            .map(|(i, command)| {
                let runner = Arc::clone(&self.runner);
                let progress = Arc::clone(&observer);
                let box_name = self.box_name.clone();
                let show_output = self.show_output;
                let step = StepProgress {
                    group: group.name.clone(),
                    step: i + 1,
                    total,
                    command: command.clone(),
                };
                Box::pin(async move {
                    run_step(runner, &box_name, step, show_output, progress.as_ref()).await
                }) as Task
            })
            .collect()
    }

    fn observer(&self) -> Arc<dyn ProgressObserver> {
        match &self.progress {
            Some(progress) => Arc::clone(progress),
            None => Arc::new(TracingProgress {
                show_output: self.show_output,
            }),
        }
    }

    fn announce(&self, message: String) {
        if self.show_output {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }
}

/// Combine parallel groups that share a name into one group, in order of
/// first appearance, so each name maps to exactly one batch.
fn merge_by_name(groups: &[&CommandGroup]) -> Vec<CommandGroup> {
    let mut merged: Vec<CommandGroup> = Vec::with_capacity(groups.len());
    for group in groups {
        match merged.iter_mut().find(|existing| existing.name == group.name) {
            Some(existing) => existing.commands.extend(group.commands.iter().cloned()),
            None => merged.push((*group).clone()),
        }
    }
    merged
}

async fn run_step(
    runner: Arc<dyn CommandRunner>,
    box_name: &str,
    step: StepProgress,
    show_output: bool,
    progress: &dyn ProgressObserver,
) -> Result<(), TaskError> {
    progress.on_step(&step);

    let output = runner
        .run(box_name, &step.command)
        .await
        .map_err(|source| TaskError::Runner {
            command: step.command.clone(),
            source,
        })?;

    if !output.status.success() {
        if !show_output {
            warn!("Command failed: {}", step.command);
            if !output.stderr.is_empty() {
                warn!("Error output: {}", output.stderr.trim_end());
            }
            if !output.stdout.is_empty() {
                warn!("Standard output: {}", output.stdout.trim_end());
            }
        }
        return Err(TaskError::CommandFailed {
            command: step.command,
            status: output.status,
            stderr: output.stderr,
        });
    }

    if show_output && !output.stdout.is_empty() {
        info!("{}", output.stdout.trim_end());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prefixes() {
        assert_eq!(CommandCategory::classify("apt install -y git"), CommandCategory::Apt);
        assert_eq!(CommandCategory::classify("APT-GET update"), CommandCategory::Apt);
        assert_eq!(CommandCategory::classify("  pip3 install flask"), CommandCategory::Python);
        assert_eq!(
            CommandCategory::classify("python3 -m pip install requests"),
            CommandCategory::Python
        );
        assert_eq!(CommandCategory::classify("python3 manage.py migrate"), CommandCategory::Other);
        assert_eq!(CommandCategory::classify("npm install -g typescript"), CommandCategory::Npm);
        assert_eq!(CommandCategory::classify("yarn global add webpack"), CommandCategory::Yarn);
        assert_eq!(CommandCategory::classify("pnpm add -g zx"), CommandCategory::Pnpm);
        assert_eq!(CommandCategory::classify("systemctl start nginx"), CommandCategory::System);
        assert_eq!(CommandCategory::classify("usermod -aG docker dev"), CommandCategory::System);
        assert_eq!(CommandCategory::classify("curl -fsSL https://x | sh"), CommandCategory::Other);
        assert_eq!(CommandCategory::classify("   "), CommandCategory::Other);
    }

    #[test]
    fn test_prefix_must_be_whole_program_name() {
        assert_eq!(CommandCategory::classify("npmx run"), CommandCategory::Other);
        assert_eq!(CommandCategory::classify("apt-cache search vim"), CommandCategory::Other);
        assert_eq!(CommandCategory::classify("pipx install black"), CommandCategory::Other);
    }

    #[test]
    fn test_categorize_ordering() {
        let commands = [
            "apt install -y git",
            "pip install flask",
            "npm install -g typescript",
            "yarn global add webpack",
            "systemctl start nginx",
        ];

        let groups = categorize_commands(&commands);
        let summary: Vec<(&str, bool, usize)> = groups
            .iter()
            .map(|g| (g.name.as_str(), g.parallel, g.commands.len()))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("System Commands", false, 1),
                ("APT Packages", false, 1),
                ("Python Packages", true, 1),
                ("NPM Packages", true, 1),
                ("Yarn Packages", true, 1),
            ]
        );
        assert_eq!(groups[0].commands, vec!["systemctl start nginx"]);
        assert_eq!(groups[1].commands, vec!["apt install -y git"]);
    }

    #[test]
    fn test_categorize_keeps_input_order_and_other_last() {
        let commands = [
            "echo first",
            "apt-get update",
            "echo second",
            "apt-get install -y curl",
        ];

        let groups = categorize_commands(&commands);
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0],
            CommandGroup::sequential(
                "APT Packages",
                vec!["apt-get update".to_string(), "apt-get install -y curl".to_string()]
            )
        );
        assert_eq!(
            groups[1],
            CommandGroup::sequential(
                "Other Commands",
                vec!["echo first".to_string(), "echo second".to_string()]
            )
        );
    }

    #[test]
    fn test_merge_by_name_keeps_first_appearance_order() {
        let npm = CommandGroup::parallel("NPM Packages", vec!["npm i -g a".to_string()]);
        let pip = CommandGroup::parallel("Python Packages", vec!["pip install b".to_string()]);
        let npm_again = CommandGroup::parallel("NPM Packages", vec!["npm i -g c".to_string()]);

        let merged = merge_by_name(&[&npm, &pip, &npm_again]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "NPM Packages");
        assert_eq!(merged[0].commands, vec!["npm i -g a", "npm i -g c"]);
        assert_eq!(merged[1], pip);
    }

    #[test]
    fn test_categorize_empty() {
        let commands: [&str; 0] = [];
        assert!(categorize_commands(&commands).is_empty());
    }
}
