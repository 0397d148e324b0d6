//! Pipeline State Management and Stage Tracking
//!
//! This module provides the state tracking structures used by the orchestrator
//! to drive one deployment run through its stages.
//!
//! **Architecture**:
//! - `PipelineState`: `Idle → Compiling → Transferring → Flashing → {Succeeded | Failed}`
//! - `DeployState`: current state, per-stage records and timing for one run
//! - Any stage failure moves straight to `Failed`, skipping the remaining stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Stage;

/// Pipeline state enumeration - discrete states in the deployment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing has run yet
    Idle,

    /// Toolchain is cross-compiling the firmware image
    Compiling,

    /// Artifact is being copied to the flash host
    Transferring,

    /// Flashing utility is programming the chip
    Flashing,

    /// All three stages exited zero
    Succeeded,

    /// A stage failed; later stages never ran
    Failed { stage: Stage, exit_code: i32 },
}

impl PipelineState {
    /// Get the human-readable name for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Compiling => "compiling",
            PipelineState::Transferring => "transferring",
            PipelineState::Flashing => "flashing",
            PipelineState::Succeeded => "succeeded",
            PipelineState::Failed { .. } => "failed",
        }
    }

    /// The running state that executes `stage`.
    pub fn running(stage: Stage) -> Self {
        match stage {
            Stage::Compile => PipelineState::Compiling,
            Stage::Transfer => PipelineState::Transferring,
            Stage::Flash => PipelineState::Flashing,
        }
    }

    /// The stage executing in this state, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Compiling => Some(Stage::Compile),
            PipelineState::Transferring => Some(Stage::Transfer),
            PipelineState::Flashing => Some(Stage::Flash),
            PipelineState::Failed { stage, .. } => Some(*stage),
            PipelineState::Idle | PipelineState::Succeeded => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed { .. })
    }

    /// Successors reachable from this state, excluding `Failed`.
    ///
    /// Every running state may additionally fail in its own stage.
    pub fn valid_next_states(&self) -> Vec<PipelineState> {
        match self {
            PipelineState::Idle => vec![PipelineState::Compiling],
            PipelineState::Compiling => vec![PipelineState::Transferring],
            PipelineState::Transferring => vec![PipelineState::Flashing],
            PipelineState::Flashing => vec![PipelineState::Succeeded],
            PipelineState::Succeeded | PipelineState::Failed { .. } => vec![],
        }
    }

    /// Check if a transition to the given state is valid.
    ///
    /// `Failed` is only reachable from a running state and must name that
    /// state's own stage.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        match next {
            PipelineState::Failed { stage, .. } => {
                !self.is_terminal() && self.stage() == Some(stage)
            }
            _ => self.valid_next_states().contains(&next),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed { stage, exit_code } => {
                write!(f, "failed({}, {})", stage, exit_code)
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// Outcome of one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,

    /// Exit code the stage finished with (0 on success)
    pub exit_code: i32,

    pub duration_ms: u64,

    /// Rendered command line, for the run report
    pub command: String,
}

/// Execution state snapshot for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployState {
    pub state: PipelineState,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Stages that ran, in execution order
    pub records: Vec<StageRecord>,

    /// Error message if the run failed
    pub error: Option<String>,
}

impl DeployState {
    pub fn new() -> Self {
        DeployState {
            state: PipelineState::Idle,
            started_at: Utc::now(),
            finished_at: None,
            records: Vec::new(),
            error: None,
        }
    }

    /// Attempt to transition to the next state.
    pub fn transition_to(&mut self, next: PipelineState) -> Result<(), String> {
        if !self.state.can_transition_to(next) {
            return Err(format!(
                "Invalid pipeline transition: {} -> {}",
                self.state, next
            ));
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn record_stage(&mut self, record: StageRecord) {
        self.records.push(record);
    }

    /// Record an error and fail the run in `stage`.
    ///
    /// The move to `Failed` goes through `transition_to`, so it is refused
    /// unless `stage` is the one currently running. The error message and
    /// finish time are kept either way.
    pub fn record_error(
        &mut self,
        stage: Stage,
        exit_code: i32,
        error: String,
    ) -> Result<(), String> {
        self.error = Some(error);
        let result = self.transition_to(PipelineState::Failed { stage, exit_code });
        self.finished_at.get_or_insert_with(Utc::now);
        result
    }

    /// Record an error that cannot be attributed to a stage.
    pub fn record_abort(&mut self, error: String) {
        self.error = Some(error);
        self.finished_at.get_or_insert_with(Utc::now);
    }

    /// Exit code of the whole pipeline, once it reached a terminal state.
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            PipelineState::Succeeded => Some(0),
            PipelineState::Failed { exit_code, .. } => Some(exit_code),
            _ => None,
        }
    }

    /// Stages in the order they were invoked.
    pub fn invoked_stages(&self) -> Vec<Stage> {
        self.records.iter().map(|r| r.stage).collect()
    }
}

impl Default for DeployState {
    fn default() -> Self {
        Self::new()
    }
}
