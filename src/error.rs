//! Unified error type hierarchy for remote_flash
//!
//! Provides structured error handling with ConfigError, RunError and StageError.
//! Every StageError carries the exit code the whole pipeline terminates with.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::Stage;
use crate::orchestrator::state::PipelineState;

/// Exit code used when the expected artifact is absent before transfer (`EX_NOINPUT`).
pub const EXIT_PRECONDITION: i32 = 66;

/// Exit code used for an internal sequencing bug (`EX_SOFTWARE`).
pub const EXIT_INTERNAL: i32 = 70;

/// Exit code used for configuration errors (`EX_CONFIG`).
pub const EXIT_CONFIG: i32 = 78;

/// Exit code used when a stage program could not be launched at all.
pub const EXIT_SPAWN: i32 = 127;

/// Exit code used when the operator interrupted the pipeline.
pub const EXIT_CANCELLED: i32 = 130;

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Errors raised by a command runner before an exit status could be observed.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("interrupted by operator")]
    Cancelled,
}

/// Pipeline stage failures. The first one raised terminates the run.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Compile stage failed with exit code {exit_code}")]
    Compile {
        exit_code: i32,
        diagnostics: Vec<String>,
    },

    #[error("Transfer stage failed with exit code {exit_code}")]
    Transfer {
        exit_code: i32,
        diagnostics: Vec<String>,
    },

    #[error("Flash stage failed with exit code {exit_code}")]
    Flash {
        exit_code: i32,
        diagnostics: Vec<String>,
    },

    #[error("Artifact missing before transfer: {}", path.display())]
    Precondition { path: PathBuf },

    #[error("{stage} stage could not launch '{program}': {reason}")]
    Spawn {
        stage: Stage,
        program: String,
        reason: String,
    },

    #[error("{stage} stage cancelled by operator")]
    Cancelled { stage: Stage },

    #[error("Invalid pipeline transition: {from} -> {to}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },
}

impl StageError {
    /// Build the stage-specific failure for a non-zero exit.
    pub fn failed(stage: Stage, exit_code: i32, diagnostics: Vec<String>) -> Self {
        match stage {
            Stage::Compile => StageError::Compile {
                exit_code,
                diagnostics,
            },
            Stage::Transfer => StageError::Transfer {
                exit_code,
                diagnostics,
            },
            Stage::Flash => StageError::Flash {
                exit_code,
                diagnostics,
            },
        }
    }

    /// Translate a runner error into the failure of the given stage.
    pub fn from_run_error(stage: Stage, err: RunError) -> Self {
        match err {
            RunError::Spawn { program, source } => StageError::Spawn {
                stage,
                program,
                reason: source.to_string(),
            },
            RunError::Cancelled => StageError::Cancelled { stage },
        }
    }

    /// The stage this error is attributed to.
    ///
    /// A rejected transition belongs to the stage that was running when it
    /// was attempted, and to no stage when the pipeline had not started.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageError::Compile { .. } => Some(Stage::Compile),
            StageError::Transfer { .. } => Some(Stage::Transfer),
            StageError::Flash { .. } => Some(Stage::Flash),
            // The precondition guards the transfer stage.
            StageError::Precondition { .. } => Some(Stage::Transfer),
            StageError::Spawn { stage, .. } | StageError::Cancelled { stage } => Some(*stage),
            StageError::InvalidTransition { from, .. } if !from.is_terminal() => from.stage(),
            StageError::InvalidTransition { .. } => None,
        }
    }

    /// Process exit code the pipeline terminates with.
    pub fn exit_code(&self) -> i32 {
        match self {
            StageError::Compile { exit_code, .. }
            | StageError::Transfer { exit_code, .. }
            | StageError::Flash { exit_code, .. } => *exit_code,
            StageError::Precondition { .. } => EXIT_PRECONDITION,
            StageError::Spawn { .. } => EXIT_SPAWN,
            StageError::Cancelled { .. } => EXIT_CANCELLED,
            StageError::InvalidTransition { .. } => EXIT_INTERNAL,
        }
    }

    /// Captured tail of the failing tool's output, if any was piped.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            StageError::Compile { diagnostics, .. }
            | StageError::Transfer { diagnostics, .. }
            | StageError::Flash { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

/// Top-level result type for operations that may fail.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
