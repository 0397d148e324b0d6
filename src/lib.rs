//! Remote firmware deployment.
//!
//! Cross-compiles an embedded firmware image, copies it to a remote host that
//! has the debug probe attached, and flashes the chip from that host:
//!
//! ```text
//! Compile (cargo) -> Transfer (scp) -> Flash (ssh + probe-run)
//! ```
//!
//! The system is organized into functional modules:
//! - **error**: stage, runner and config error types plus exit code mapping
//! - **models**: build configuration, artifacts, remote endpoint, flash request
//! - **config**: TOML config loading, command-line overrides, validation
//! - **orchestrator**: pipeline state machine, process/remote executors, stages
//! - **log_collector**: `log` backend persisting full and parsed session logs

// Core foundational modules
pub mod error;
pub mod models;

pub mod config;

// Decoupled logging backend
pub mod log_collector;

pub mod orchestrator;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{ConfigError, Result, RunError, StageError};

pub use models::{
    Artifact, BuildConfiguration, BuildProfile, DeployConfig, FlashRequest, FlashTool,
    OptimizationMode, RemoteEndpoint, Stage, TransferReceipt,
};

pub use config::{load_config, ConfigOverrides};

pub use orchestrator::{
    CommandRunner, CommandSpec, DeployOrchestrator, DeployState, ExitResult, MockRemoteExecutor,
    MockRunner, PipelineState, ProcessRunner, RemoteExecutor, SshExecutor, StageRecord,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
