//! Remote command sessions.
//!
//! `RemoteExecutor` runs one command line on a named host and reports the
//! remote command's exit code as its own. `SshExecutor` implements it on top of
//! any `CommandRunner` by building the `ssh` argument vector.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::executor::{CommandRunner, CommandSpec, ExitResult};
use crate::error::RunError;

/// Capability to run a command line on a remote host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on `host`; `interactive` allocates a remote terminal.
    async fn run(&self, host: &str, command: &str, interactive: bool) -> Result<ExitResult, RemoteError>;

    /// The local invocation `run` would perform, for logs and dry runs.
    fn describe(&self, host: &str, command: &str, interactive: bool) -> CommandSpec;
}

/// Runner errors surface unchanged through the remote layer.
pub type RemoteError = RunError;

/// Production executor: `ssh [-t] [-o opt]... <host> <command>`.
pub struct SshExecutor<R> {
    runner: R,
    program: String,
    options: Vec<String>,
}

impl<R: CommandRunner> SshExecutor<R> {
    pub fn new(runner: R, program: impl Into<String>, options: Vec<String>) -> Self {
        SshExecutor {
            runner,
            program: program.into(),
            options,
        }
    }

    /// Build the ssh invocation. `-t` forces terminal allocation so progress
    /// output and prompts from the remote tool reach the operator.
    pub fn command_spec(&self, host: &str, command: &str, interactive: bool) -> CommandSpec {
        let mut spec = CommandSpec::new(self.program.clone()).interactive(interactive);
        if interactive {
            spec = spec.arg("-t");
        }
        for option in &self.options {
            spec = spec.arg("-o").arg(option.clone());
        }
        spec.arg(host).arg(command)
    }
}

#[async_trait]
impl<R: CommandRunner> RemoteExecutor for SshExecutor<R> {
    async fn run(&self, host: &str, command: &str, interactive: bool) -> Result<ExitResult, RemoteError> {
        let spec = self.command_spec(host, command, interactive);
        log::info!("[Deploy] [REMOTE] {} $ {}", host, command);
        self.runner.run(&spec).await
    }

    fn describe(&self, host: &str, command: &str, interactive: bool) -> CommandSpec {
        self.command_spec(host, command, interactive)
    }
}

/// One call recorded by `MockRemoteExecutor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub host: String,
    pub command: String,
    pub interactive: bool,
}

/// Test-double remote executor: records calls, replays scripted exit codes.
#[derive(Clone, Default)]
pub struct MockRemoteExecutor {
    calls: Arc<Mutex<Vec<RemoteCall>>>,
    exit_codes: Arc<Mutex<Vec<i32>>>,
}

impl MockRemoteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor answering calls with the given exit codes, then zero.
    pub fn with_exit_codes(codes: &[i32]) -> Self {
        let mut reversed = codes.to_vec();
        reversed.reverse();
        MockRemoteExecutor {
            calls: Arc::new(Mutex::new(Vec::new())),
            exit_codes: Arc::new(Mutex::new(reversed)),
        }
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl RemoteExecutor for MockRemoteExecutor {
    async fn run(&self, host: &str, command: &str, interactive: bool) -> Result<ExitResult, RemoteError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(RemoteCall {
                host: host.to_string(),
                command: command.to_string(),
                interactive,
            });
        let code = self
            .exit_codes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop()
            .unwrap_or(0);
        Ok(ExitResult::new(code, Vec::new()))
    }

    fn describe(&self, host: &str, command: &str, interactive: bool) -> CommandSpec {
        CommandSpec::new("mock-remote")
            .interactive(interactive)
            .args([host, command])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::executor::MockRunner;

    #[test]
    fn test_interactive_ssh_allocates_terminal() {
        let ssh = SshExecutor::new(MockRunner::new(), "ssh", vec![]);
        let spec = ssh.command_spec("buildhost", "probe-run --chip chipX /tmp/fw.bin", true);
        assert_eq!(spec.program, "ssh");
        assert_eq!(
            spec.args,
            vec!["-t", "buildhost", "probe-run --chip chipX /tmp/fw.bin"]
        );
        assert!(spec.interactive);
    }

    #[test]
    fn test_batch_ssh_passes_options() {
        let ssh = SshExecutor::new(MockRunner::new(), "ssh", vec!["BatchMode=yes".into()]);
        let spec = ssh.command_spec("buildhost", "true", false);
        assert_eq!(spec.args, vec!["-o", "BatchMode=yes", "buildhost", "true"]);
        assert!(!spec.interactive);
    }

    #[tokio::test]
    async fn test_ssh_executor_returns_remote_exit_code() {
        let runner = MockRunner::with_exit_codes(&[2]);
        let ssh = SshExecutor::new(runner.clone(), "ssh", vec![]);
        let result = ssh.run("buildhost", "probe-run", true).await.unwrap();
        assert_eq!(result.code, 2);
        assert_eq!(runner.programs(), vec!["ssh"]);
    }

    #[tokio::test]
    async fn test_mock_remote_executor_records_calls() {
        let remote = MockRemoteExecutor::with_exit_codes(&[1]);
        assert_eq!(remote.run("h", "a", true).await.unwrap().code, 1);
        assert_eq!(remote.run("h", "b", false).await.unwrap().code, 0);
        let calls = remote.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].command, "a");
        assert!(!calls[1].interactive);
    }
}
