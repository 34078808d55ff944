use std::collections::HashMap;
use std::time::Duration;

use crate::subprocess::ProcessCommand;

/// Fluent construction of [`ProcessCommand`] values.
pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: ProcessCommand {
                program: program.to_string(),
                args: Vec::new(),
                env: HashMap::new(),
                timeout: None,
            },
        }
    }

    /// Start a `docker exec <container>` invocation.
    pub fn docker_exec(container: &str) -> Self {
        Self::new("docker").arg("exec").arg(container)
    }

    /// Append `bash -c <script>` so the script is interpreted by a shell
    /// inside the target.
    pub fn bash_script(self, script: &str) -> Self {
        self.args(["bash", "-c", script])
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.command.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.command.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.command.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}
