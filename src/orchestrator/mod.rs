//! Deploy Orchestration: 3-stage firmware pipeline (Compile -> Transfer -> Flash).
//!
//! Each stage runs only if the previous one succeeded. The first failure is
//! terminal and its exit code becomes the exit code of the whole run.

pub mod executor;
pub mod phases;
pub mod remote;
pub mod state;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

pub use executor::{
    CommandRunner, CommandSpec, ExitResult, MockOutcome, MockRunner, ProcessRunner,
};
pub use remote::{MockRemoteExecutor, RemoteCall, RemoteExecutor, SshExecutor};
pub use state::{DeployState, PipelineState, StageRecord};

use crate::error::StageError;
use crate::models::{Artifact, DeployConfig, FlashRequest, Stage, TransferReceipt};
use crate::LogCollector;

/// Drives one firmware deployment through its three stages.
///
/// Local commands go through `R`, the remote flash session through `X`, so
/// the whole pipeline can be exercised against test doubles.
pub struct DeployOrchestrator<R, X> {
    config: DeployConfig,

    runner: R,

    remote: X,

    /// Shared state, readable by observers while a run is in flight
    state: Arc<RwLock<DeployState>>,

    /// Log collector for stage milestones
    log_collector: Option<Arc<LogCollector>>,
}

impl<R: CommandRunner, X: RemoteExecutor> DeployOrchestrator<R, X> {
    pub fn new(config: DeployConfig, runner: R, remote: X) -> Self {
        DeployOrchestrator {
            config,
            runner,
            remote,
            state: Arc::new(RwLock::new(DeployState::new())),
            log_collector: None,
        }
    }

    pub fn with_log_collector(mut self, collector: Arc<LogCollector>) -> Self {
        self.log_collector = Some(collector);
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub async fn current_state(&self) -> PipelineState {
        self.state.read().await.state
    }

    /// Copy of the state for reporting.
    pub async fn state_snapshot(&self) -> DeployState {
        self.state.read().await.clone()
    }

    /// Write the current state as pretty JSON to `path`.
    pub async fn write_report(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.state_snapshot().await)?;
        tokio::fs::write(path, json).await
    }

    /// Transition to the next pipeline state.
    ///
    /// # Errors
    /// Returns `StageError::InvalidTransition` if the transition is not legal
    /// from the current state.
    pub async fn transition(&self, next: PipelineState) -> Result<(), StageError> {
        let mut state = self.state.write().await;
        let from = state.state;
        state
            .transition_to(next)
            .map_err(|_| StageError::InvalidTransition { from, to: next })?;
        drop(state);

        log::debug!("[Deploy] [STATE] {} -> {}", from, next);
        if let Some(ref collector) = self.log_collector {
            collector.log_parsed(format!("STATE TRANSITION: {} -> {}", from, next));
        }
        Ok(())
    }

    /// Run the full pipeline once.
    ///
    /// State is reset to `Idle` first, so an orchestrator can be run again
    /// without carrying anything over from the previous run.
    pub async fn run(&self) -> Result<(), StageError> {
        *self.state.write().await = DeployState::new();
        log::info!(
            "[Deploy] Starting deployment of {} to {} (chip {})",
            self.config.build.binary_name,
            self.config.remote.scp_destination(),
            self.config.chip_model
        );

        let outcome = match self.run_stages().await {
            Ok(()) => self.transition(PipelineState::Succeeded).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                log::info!("[Deploy] ✓ Deployment succeeded");
                Ok(())
            }
            Err(e) => {
                log::error!("[Deploy] ✗ {}", e);
                for line in e.diagnostics() {
                    log::debug!("[Deploy] [DIAG] {}", line);
                }
                self.fail(&e).await;
                if let Some(ref collector) = self.log_collector {
                    collector.log_parsed(format!("FAILED: {}", e));
                }
                Err(e)
            }
        }
    }

    /// Move the state to `Failed` in the error's stage through the state machine.
    async fn fail(&self, err: &StageError) {
        let mut state = self.state.write().await;
        let stage = match err.stage() {
            Some(stage) => stage,
            None => return state.record_abort(err.to_string()),
        };
        let from = state.state;
        match state.record_error(stage, err.exit_code(), err.to_string()) {
            Ok(()) => log::debug!("[Deploy] [STATE] {} -> {}", from, state.state),
            Err(msg) => log::error!("[Deploy] [STATE] {}", msg),
        }
    }

    async fn run_stages(&self) -> Result<(), StageError> {
        self.transition(PipelineState::running(Stage::Compile)).await?;
        let command = phases::compile_command(&self.config).to_string();
        let artifact = self
            .timed(Stage::Compile, command, phases::run_compile(&self.runner, &self.config))
            .await?;

        self.transition(PipelineState::running(Stage::Transfer)).await?;
        let command = phases::transfer_command(&self.config, &artifact).to_string();
        let receipt = self
            .timed(
                Stage::Transfer,
                command,
                phases::run_transfer(&self.runner, &self.config, &artifact),
            )
            .await?;

        self.transition(PipelineState::running(Stage::Flash)).await?;
        let request = FlashRequest::from_receipt(&receipt, &self.config.chip_model);
        let command = self.flash_spec(&request).to_string();
        self.timed(
            Stage::Flash,
            command,
            phases::run_flash(&self.remote, &self.config, &request),
        )
        .await
    }

    /// Await one stage and record its outcome.
    ///
    /// A precondition failure leaves no record: no external tool was invoked.
    async fn timed<T, F>(&self, stage: Stage, command: String, stage_fut: F) -> Result<T, StageError>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        let started = Instant::now();
        let outcome = stage_fut.await;
        let exit_code = match &outcome {
            Ok(_) => 0,
            Err(StageError::Precondition { .. }) => return outcome,
            Err(e) => e.exit_code(),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "[Deploy] [{}] Finished in {} ms (exit code {})",
            stage.as_str().to_uppercase(),
            duration_ms,
            exit_code
        );
        self.state.write().await.record_stage(StageRecord {
            stage,
            exit_code,
            duration_ms,
            command,
        });
        outcome
    }

    fn flash_spec(&self, request: &FlashRequest) -> CommandSpec {
        let command = phases::flash_command_line(&self.config, request);
        self.remote
            .describe(request.host(), &command, self.config.interactive)
    }

    /// The three commands a run would execute, in order, without executing them.
    pub fn plan(&self) -> Vec<CommandSpec> {
        let artifact = Artifact::new(self.config.build.artifact_path());
        let receipt = TransferReceipt::new(self.config.remote.clone(), artifact.path.clone());
        let request = FlashRequest::from_receipt(&receipt, &self.config.chip_model);
        vec![
            phases::compile_command(&self.config),
            phases::transfer_command(&self.config, &artifact),
            self.flash_spec(&request),
        ]
    }
}
