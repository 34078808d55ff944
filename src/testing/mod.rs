//! In-memory command runner for exercising executors without a box
//!
//! [`ScriptedRunner`] answers each command string from a script, can delay
//! its answer to simulate slow installs, records every call in arrival order
//! and tracks the highest number of commands it saw running at once.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::sandbox::CommandRunner;
use crate::subprocess::{ProcessError, ProcessOutput};

#[derive(Debug, Clone, Default)]
struct Script {
    stdout: String,
    stderr: String,
    exit_code: i32,
    delay: Option<Duration>,
    unavailable: bool,
}

impl Script {
    fn output(&self) -> ProcessOutput {
        let base = if self.exit_code == 0 {
            ProcessOutput::success(self.stdout.clone())
        } else {
            ProcessOutput::failure(self.exit_code, self.stderr.clone())
        };
        ProcessOutput {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            duration: self.delay.unwrap_or_default(),
            ..base
        }
    }
}

/// Builder for [`ScriptedRunner`]. Unscripted commands succeed with empty
/// output. The default delay applies to every command without its own
/// delay, whenever it was set.
#[derive(Debug, Default)]
pub struct ScriptedRunnerBuilder {
    scripts: HashMap<String, Script>,
    default_delay: Duration,
}

impl ScriptedRunnerBuilder {
    pub fn with_success(mut self, command: &str, stdout: &str) -> Self {
        self.script(command).stdout = stdout.to_string();
        self
    }

    pub fn with_error(mut self, command: &str, stderr: &str, exit_code: i32) -> Self {
        let script = self.script(command);
        script.stderr = stderr.to_string();
        script.exit_code = exit_code;
        self
    }

    /// The runner itself fails for `command`, as when the box is not running.
    pub fn with_unavailable(mut self, command: &str) -> Self {
        self.script(command).unavailable = true;
        self
    }

    pub fn with_delay(mut self, command: &str, delay: Duration) -> Self {
        self.script(command).delay = Some(delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn build(self) -> ScriptedRunner {
        let default_delay = self.default_delay;
        let scripts = self
            .scripts
            .into_iter()
            .map(|(command, mut script)| {
                script.delay.get_or_insert(default_delay);
                (command, script)
            })
            .collect();

        ScriptedRunner {
            scripts,
            default_delay: self.default_delay,
            calls: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn script(&mut self, command: &str) -> &mut Script {
        self.scripts.entry(command.to_string()).or_default()
    }
}

#[derive(Debug)]
pub struct ScriptedRunner {
    scripts: HashMap<String, Script>,
    default_delay: Duration,
    calls: Mutex<Vec<(String, String)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ScriptedRunner {
    pub fn builder() -> ScriptedRunnerBuilder {
        ScriptedRunnerBuilder::default()
    }

    /// Every `(environment, command)` pair received, in arrival order
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    pub fn was_called(&self, command: &str) -> bool {
        self.call_count(command) > 0
    }

    pub fn call_count(&self, command: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|(_, called)| called == command)
            .count()
    }

    /// Highest number of commands that were running at the same time
    pub fn max_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, environment: &str, command: &str) -> Result<ProcessOutput, ProcessError> {
        lock(&self.calls).push((environment.to_string(), command.to_string()));

        let script = self.scripts.get(command).cloned().unwrap_or(Script {
            delay: Some(self.default_delay),
            ..Script::default()
        });

        let _running = RunningGuard::enter(&self.running, &self.peak);
        let delay = script.delay.unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if script.unavailable {
            return Err(ProcessError::InternalError {
                message: format!("environment '{environment}' is not running"),
            });
        }
        Ok(script.output())
    }
}

/// Counts a command as running until dropped, including when the calling
/// future is cancelled mid-sleep.
struct RunningGuard<'a> {
    running: &'a AtomicUsize,
}

impl<'a> RunningGuard<'a> {
    fn enter(running: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { running }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
