//! External command execution
//!
//! Real backends drive OS tooling (ipmctl, ndctl, the SPDK setup script)
//! through a [`CommandRunner`] so that their parsing can be exercised
//! against canned output.

use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// A command line plus the environment it runs with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Look up an environment value set on this command
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Program and arguments joined by spaces
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Port for running external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion; non-zero exit is an error
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

pub type CommandRunnerRef = Arc<dyn CommandRunner>;

// =============================================================================
// System Runner
// =============================================================================

/// Runs commands on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let rendered = command.render();
        debug!("running: {}", rendered);

        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
            .map_err(|e| Error::CommandFailed {
                command: rendered.clone(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let reason = if stderr.trim().is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::CommandFailed {
                command: rendered,
                reason,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

// =============================================================================
// Scripted Runner
// =============================================================================

type Scripted = std::result::Result<String, String>;

/// Answers commands from canned output keyed by the rendered command line.
///
/// Each key holds a queue of answers; the last one repeats. Unknown
/// commands fail.
#[derive(Default)]
pub struct ScriptedRunner {
    answers: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout` when `command` runs
    pub fn on(self, command: &str, stdout: &str) -> Self {
        self.push(command, Ok(stdout.to_string()));
        self
    }

    /// Fail with `reason` when `command` runs
    pub fn fail(self, command: &str, reason: &str) -> Self {
        self.push(command, Err(reason.to_string()));
        self
    }

    /// Commands run so far
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Rendered command lines run so far
    pub fn rendered_calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(CommandSpec::render).collect()
    }

    fn push(&self, command: &str, answer: Scripted) {
        self.answers
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(answer);
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().push(command.clone());

        let rendered = command.render();
        let answer = {
            let mut answers = self.answers.lock();
            answers.get_mut(&rendered).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };

        match answer {
            Some(Ok(stdout)) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            Some(Err(reason)) => Err(Error::CommandFailed {
                command: rendered,
                reason,
            }),
            None => Err(Error::CommandFailed {
                command: rendered,
                reason: "no scripted output".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let cmd = CommandSpec::new("ndctl").args(["list", "--regions"]);
        assert_eq!(cmd.render(), "ndctl list --regions");
        assert_eq!(CommandSpec::new("lspci").render(), "lspci");
    }

    #[test]
    fn test_env_lookup() {
        let cmd = CommandSpec::new("setup.sh").env("NRHUGE", "42");
        assert_eq!(cmd.env_value("NRHUGE"), Some("42"));
        assert_eq!(cmd.env_value("TARGET_USER"), None);
        // Environment does not show in the rendered line
        assert_eq!(cmd.render(), "setup.sh");
    }

    #[tokio::test]
    async fn test_scripted_runner_queues() {
        let runner = ScriptedRunner::new()
            .on("ndctl list --regions", "first")
            .on("ndctl list --regions", "second");
        let cmd = CommandSpec::new("ndctl").args(["list", "--regions"]);

        assert_eq!(runner.run(&cmd).await.unwrap().stdout, "first");
        assert_eq!(runner.run(&cmd).await.unwrap().stdout, "second");
        assert_eq!(runner.run(&cmd).await.unwrap().stdout, "second");
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_runner_failures() {
        let runner = ScriptedRunner::new().fail("ipmctl delete -goal", "no permission");

        let err = runner
            .run(&CommandSpec::new("ipmctl").args(["delete", "-goal"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no permission"));

        let err = runner.run(&CommandSpec::new("lspci")).await.unwrap_err();
        assert!(err.to_string().contains("no scripted output"));
    }

    #[tokio::test]
    async fn test_system_runner_reports_exit_status() {
        let err = SystemRunner
            .run(&CommandSpec::new("false"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("false"));

        let out = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "printf $GREETING"]).env("GREETING", "hello"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello");
    }
}
