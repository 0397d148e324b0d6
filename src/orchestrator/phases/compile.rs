//! Phase 1: Compile - cross-compile the firmware image.
//!
//! The toolchain runs in the project root with `RUSTFLAGS` set for the child
//! process only. The flags carry the linker script and the cross-module
//! optimization mode. On success the artifact sits at the path derived from
//! the target triple and build profile.

use crate::error::StageError;
use crate::models::{Artifact, BuildProfile, DeployConfig, Stage};
use crate::orchestrator::executor::{CommandRunner, CommandSpec};

/// Environment variable carrying the scoped compiler flags.
pub const RUSTFLAGS_VAR: &str = "RUSTFLAGS";

/// Build the toolchain invocation: `cargo build --target <triple> [--release]`.
pub fn compile_command(config: &DeployConfig) -> CommandSpec {
    let build = &config.build;
    let mut spec = CommandSpec::new(config.toolchain.clone())
        .args(["build", "--target", build.target_triple.as_str()])
        .env(RUSTFLAGS_VAR, build.rustflags())
        .current_dir(build.project_dir.clone());
    if build.profile == BuildProfile::Release {
        spec = spec.arg("--release");
    }
    spec
}

/// Run the compile stage and return the produced artifact.
///
/// # Returns
/// * `Ok(Artifact)` when the toolchain exits zero
/// * `Err(StageError::Compile)` carrying the toolchain's exit code otherwise
pub async fn run_compile<R>(runner: &R, config: &DeployConfig) -> Result<Artifact, StageError>
where
    R: CommandRunner + ?Sized,
{
    let spec = compile_command(config);
    log::info!(
        "[Deploy] [COMPILE] Target: {}, profile: {}, optimization: {}",
        config.build.target_triple,
        config.build.profile,
        config.build.optimization
    );
    log::info!("[Deploy] [COMPILE] {}", spec);

    let result = runner
        .run(&spec)
        .await
        .map_err(|e| StageError::from_run_error(Stage::Compile, e))?;

    if !result.is_success() {
        log::error!("[Deploy] [COMPILE] Toolchain exited with code {}", result.code);
        return Err(StageError::failed(Stage::Compile, result.code, result.diagnostics));
    }

    let artifact = Artifact::new(config.build.artifact_path());
    log::info!("[Deploy] [COMPILE] Artifact: {}", artifact.path.display());
    Ok(artifact)
}
