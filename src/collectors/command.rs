use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout of a successful run; otherwise an error carrying stderr.
    pub fn into_stdout(self) -> anyhow::Result<String> {
        if self.success() {
            return Ok(self.stdout);
        }

        let stderr = self.stderr.trim();
        match (self.code, stderr.is_empty()) {
            (Some(code), true) => bail!("exited with status {code}"),
            (Some(_), false) => bail!("{stderr}"),
            (None, _) => bail!("terminated by signal"),
        }
    }
}

/// Seam between the collectors and the processes they spawn.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> anyhow::Result<CommandOutput>;
}

/// Runs commands as child processes of the monitor.
///
/// The child is killed when the timeout elapses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> anyhow::Result<CommandOutput> {
        trace!("running {program} {}", args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {program}"))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("{program} timed out after {}s", timeout.as_secs()))?
            .with_context(|| format!("failed to wait for {program}"))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Answers commands from a script: the first rule whose pattern occurs in
    /// the command line wins. Unmatched commands fail.
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Vec<(String, Result<CommandOutput, String>)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, pattern: &str, output: CommandOutput) -> Self {
            self.rules.push((pattern.to_string(), Ok(output)));
            self
        }

        pub fn fail(mut self, pattern: &str, error: &str) -> Self {
            self.rules.push((pattern.to_string(), Err(error.to_string())));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> anyhow::Result<CommandOutput> {
            let line = std::iter::once(program)
                .chain(args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ");
            self.calls.lock().unwrap().push(line.clone());

            match self.rules.iter().find(|(pattern, _)| line.contains(pattern)) {
                Some((_, Ok(output))) => Ok(output.clone()),
                Some((_, Err(error))) => bail!("{error}"),
                None => bail!("unexpected command: {line}"),
            }
        }
    }
}
