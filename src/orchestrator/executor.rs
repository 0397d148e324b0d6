//! Process execution: command specs, output streaming, cancellation.
//!
//! Integrates with the unified logging pipeline via LogCollector for:
//! - Verbatim forwarding of toolchain output to the operator's terminal
//! - Parsed milestone logging (Compiling/Finished/error lines)
//! - Full detailed output persistence
//!
//! `CommandRunner` is the seam the pipeline stages execute through.
//! `ProcessRunner` spawns real processes; `MockRunner` records invocations and
//! replays scripted exit codes for tests.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;

use crate::error::RunError;
use crate::LogCollector;

/// Number of trailing output lines kept as failure diagnostics.
pub const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// A fully described child process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,

    /// Variables set for this child only
    pub env: BTreeMap<String, String>,

    pub current_dir: Option<PathBuf>,

    /// Attach the child to the operator's terminal instead of piping its output
    pub interactive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
            interactive: false,
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
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Shell-style rendering, used for logs, reports and dry runs.
    pub fn command_line(&self) -> String {
        let mut words: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
            .collect();
        words.push(shell_quote(&self.program));
        words.extend(self.args.iter().map(|a| shell_quote(a)));
        words.join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Exit status of a finished command plus the tail of its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitResult {
    pub code: i32,

    /// Last output lines (empty for interactive sessions)
    pub diagnostics: Vec<String>,
}

impl ExitResult {
    pub fn success() -> Self {
        ExitResult {
            code: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn new(code: i32, diagnostics: Vec<String>) -> Self {
        ExitResult { code, diagnostics }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Trait for executing command specs. Blocks the pipeline until the child exits.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<ExitResult, RunError>;
}

/// True for characters no POSIX shell treats specially.
pub fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c)
}

/// Quote a word for a POSIX shell; words made only of safe characters pass through.
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_shell_safe) {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Map an exit status to a shell-style code: the code itself, or 128+signal.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Recognizes cargo's high-level progress lines.
fn parse_milestone(line: &str) -> Option<String> {
    static MILESTONE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = MILESTONE
        .get_or_init(|| Regex::new(r"^\s*(Compiling|Finished|error(\[E\d+\])?:|warning:)").ok())
        .as_ref()?;
    re.is_match(line).then(|| line.trim().to_string())
}

/// Production runner spawning real child processes.
///
/// Non-interactive children have stdout/stderr piped and forwarded line by line;
/// interactive children inherit the terminal. Either way the child is killed
/// when the cancellation channel flips to `true`.
pub struct ProcessRunner {
    cancel_rx: watch::Receiver<bool>,
    log_collector: Option<Arc<LogCollector>>,
}

impl ProcessRunner {
    pub fn new(cancel_rx: watch::Receiver<bool>, log_collector: Option<Arc<LogCollector>>) -> Self {
        ProcessRunner {
            cancel_rx,
            log_collector,
        }
    }

    fn build_command(&self, spec: &CommandSpec) -> Command {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        // Scoped to the child; the parent environment is never touched.
        command.envs(&spec.env);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        command.kill_on_drop(true);
        if spec.interactive {
            command.stdin(Stdio::inherit());
            command.stdout(Stdio::inherit());
            command.stderr(Stdio::inherit());
        } else {
            command.stdin(Stdio::null());
            command.stdout(Stdio::piped());
            command.stderr(Stdio::piped());
        }
        command
    }

    fn forward_line(&self, line: &str, tail: &mut VecDeque<String>, is_stderr: bool) {
        // Operator sees the tool's output verbatim
        if is_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }

        if let Some(ref collector) = self.log_collector {
            collector.log_str(line);
            if let Some(milestone) = parse_milestone(line) {
                collector.log_parsed(milestone);
            }
        }

        if tail.len() == DIAGNOSTIC_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }

    /// Wait for cancellation; never resolves if the sender is gone.
    async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
        loop {
            if *cancel_rx.borrow() {
                return;
            }
            if cancel_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ExitResult, RunError> {
        let mut cancel_rx = self.cancel_rx.clone();
        if *cancel_rx.borrow() {
            return Err(RunError::Cancelled);
        }

        log::debug!("[Deploy] [EXEC] {}", spec);
        let mut child = self
            .build_command(spec)
            .spawn()
            .map_err(|source| RunError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        if spec.interactive {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = Self::cancelled(&mut cancel_rx) => {
                    log::warn!("[Deploy] [EXEC] Cancellation received, killing '{}'", spec.program);
                    let _ = child.kill().await;
                    return Err(RunError::Cancelled);
                }
            };
            let status = status.map_err(|source| RunError::Spawn {
                program: spec.program.clone(),
                source,
            })?;
            return Ok(ExitResult::new(exit_code_of(status), Vec::new()));
        }

        let stdout = child.stdout.take().ok_or_else(|| RunError::Spawn {
            program: spec.program.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "stdout not captured"),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| RunError::Spawn {
            program: spec.program.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "stderr not captured"),
        })?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_closed = false;
        let mut stderr_closed = false;
        let mut tail = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);

        while !(stdout_closed && stderr_closed) {
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_closed => match line {
                    Ok(Some(line)) => self.forward_line(&line, &mut tail, false),
                    Ok(None) => stdout_closed = true,
                    Err(e) => {
                        log::warn!("[Deploy] [EXEC] stdout read error: {}", e);
                        stdout_closed = true;
                    }
                },
                line = stderr_lines.next_line(), if !stderr_closed => match line {
                    Ok(Some(line)) => self.forward_line(&line, &mut tail, true),
                    Ok(None) => stderr_closed = true,
                    Err(e) => {
                        log::warn!("[Deploy] [EXEC] stderr read error: {}", e);
                        stderr_closed = true;
                    }
                },
                _ = Self::cancelled(&mut cancel_rx) => {
                    log::warn!("[Deploy] [EXEC] Cancellation received, killing '{}'", spec.program);
                    let _ = child.kill().await;
                    return Err(RunError::Cancelled);
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status,
            _ = Self::cancelled(&mut cancel_rx) => {
                let _ = child.kill().await;
                return Err(RunError::Cancelled);
            }
        };
        let status = status.map_err(|source| RunError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let code = exit_code_of(status);
        log::debug!("[Deploy] [EXEC] '{}' exited with {}", spec.program, code);
        Ok(ExitResult::new(code, tail.into_iter().collect()))
    }
}

/// Scripted outcome for one `MockRunner` invocation.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Exit(i32),
    SpawnFailure,
    Cancelled,
}

#[derive(Default)]
struct MockState {
    outcomes: VecDeque<MockOutcome>,
    invocations: Vec<CommandSpec>,
}

/// Test-double runner that records specs and replays scripted outcomes.
///
/// Clones share the same script and invocation log. Once the script is
/// exhausted every invocation succeeds.
#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner answering invocations with the given exit codes, in order.
    pub fn with_exit_codes(codes: &[i32]) -> Self {
        Self::with_outcomes(codes.iter().map(|c| MockOutcome::Exit(*c)).collect())
    }

    pub fn with_outcomes(outcomes: Vec<MockOutcome>) -> Self {
        let runner = Self::new();
        runner
            .state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .outcomes = outcomes.into();
        runner
    }

    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .invocations
            .clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations().into_iter().map(|s| s.program).collect()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ExitResult, RunError> {
        let outcome = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.invocations.push(spec.clone());
            state.outcomes.pop_front()
        };
        match outcome.unwrap_or(MockOutcome::Exit(0)) {
            MockOutcome::Exit(0) => Ok(ExitResult::success()),
            MockOutcome::Exit(code) => Ok(ExitResult::new(
                code,
                vec![format!("{}: mock failure", spec.program)],
            )),
            MockOutcome::SpawnFailure => Err(RunError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock: not found"),
            }),
            MockOutcome::Cancelled => Err(RunError::Cancelled),
        }
    }
}
