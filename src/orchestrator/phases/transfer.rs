//! Phase 2: Transfer - copy the artifact to the flash host.
//!
//! Single-shot `scp` of the local image to `<host>:<remote path>`, overwriting
//! whatever is there. No retry, no resume.

use crate::error::StageError;
use crate::models::{Artifact, DeployConfig, Stage, TransferReceipt};
use crate::orchestrator::executor::{CommandRunner, CommandSpec};
use std::path::{Component, Path};

/// Verifies the artifact the compile stage promised is actually on disk.
pub fn check_artifact(artifact: &Artifact) -> Result<(), StageError> {
    if !artifact.path.is_file() {
        log::error!(
            "[Deploy] [TRANSFER] Artifact not found at: {}",
            artifact.path.display()
        );
        return Err(StageError::Precondition {
            path: artifact.path.clone(),
        });
    }
    Ok(())
}

/// The local operand for scp.
///
/// A bare relative path such as `out:fw.bin` would be read as `host:path`,
/// so it gets a `./` prefix. Non-UTF-8 paths are rejected at config load.
pub fn local_operand(path: &Path) -> String {
    match path.components().next() {
        Some(Component::Normal(_)) => Path::new(".").join(path).to_string_lossy().into_owned(),
        _ => path.to_string_lossy().into_owned(),
    }
}

/// Build the copy invocation: `scp [-o opt]... <local> <host>:<path>`.
pub fn transfer_command(config: &DeployConfig, artifact: &Artifact) -> CommandSpec {
    let mut spec = CommandSpec::new(config.copy_program.clone());
    for option in &config.ssh_options {
        spec = spec.arg("-o").arg(option.clone());
    }
    spec.arg(local_operand(&artifact.path))
        .arg(config.remote.scp_destination())
}

/// Run the transfer stage.
///
/// # Returns
/// * `Ok(TransferReceipt)` naming the endpoint the artifact now lives on
/// * `Err(StageError::Precondition)` if the artifact is missing (nothing is invoked)
/// * `Err(StageError::Transfer)` with the copy utility's exit code otherwise
pub async fn run_transfer<R>(
    runner: &R,
    config: &DeployConfig,
    artifact: &Artifact,
) -> Result<TransferReceipt, StageError>
where
    R: CommandRunner + ?Sized,
{
    check_artifact(artifact)?;

    let spec = transfer_command(config, artifact);
    log::info!(
        "[Deploy] [TRANSFER] {} -> {}",
        artifact.path.display(),
        config.remote.scp_destination()
    );

    let result = runner
        .run(&spec)
        .await
        .map_err(|e| StageError::from_run_error(Stage::Transfer, e))?;

    if !result.is_success() {
        log::error!("[Deploy] [TRANSFER] Copy exited with code {}", result.code);
        return Err(StageError::failed(Stage::Transfer, result.code, result.diagnostics));
    }

    Ok(TransferReceipt::new(config.remote.clone(), artifact.path.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::executor::MockRunner;
    use std::fs;
    use tempfile::TempDir;

    fn artifact_in(dir: &TempDir) -> Artifact {
        let path = dir.path().join("fw.bin");
        fs::write(&path, b"\x7fELF").expect("Failed to write artifact");
        Artifact::new(path)
    }

    #[test]
    fn test_transfer_command_shape() {
        let mut config = DeployConfig::default();
        config.remote.host = "buildhost".into();
        config.remote.artifact_path = "/tmp/fw.bin".into();
        config.ssh_options = vec!["BatchMode=yes".into()];

        let spec = transfer_command(&config, &Artifact::new("fw.bin"));
        assert_eq!(spec.program, "scp");
        assert_eq!(
            spec.args,
            vec!["-o", "BatchMode=yes", "./fw.bin", "buildhost:/tmp/fw.bin"]
        );
        assert!(spec.env.is_empty());
    }

    #[test]
    fn test_local_operand_never_looks_remote() {
        assert_eq!(local_operand(Path::new("out:fw.bin")), "./out:fw.bin");
        assert_eq!(local_operand(Path::new("target/fw.elf")), "./target/fw.elf");
        assert_eq!(local_operand(Path::new("./target/fw.elf")), "./target/fw.elf");
        assert_eq!(local_operand(Path::new("../fw.elf")), "../fw.elf");
        assert_eq!(local_operand(Path::new("/abs/fw.elf")), "/abs/fw.elf");
    }

    #[tokio::test]
    async fn test_missing_artifact_never_invokes_copy() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let artifact = Artifact::new(dir.path().join("absent.bin"));

        let err = run_transfer(&runner, &DeployConfig::default(), &artifact)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Precondition { .. }));
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_directory_is_not_an_artifact() {
        let dir = TempDir::new().unwrap();
        assert!(check_artifact(&Artifact::new(dir.path())).is_err());
    }

    #[tokio::test]
    async fn test_successful_transfer_returns_receipt() {
        let dir = TempDir::new().unwrap();
        let artifact = artifact_in(&dir);
        let runner = MockRunner::new();
        let config = DeployConfig::default();

        let receipt = run_transfer(&runner, &config, &artifact).await.unwrap();
        assert_eq!(receipt.endpoint(), &config.remote);
        assert_eq!(receipt.local_path(), artifact.path.as_path());
    }

    #[tokio::test]
    async fn test_unreachable_host_propagates_code() {
        let dir = TempDir::new().unwrap();
        let artifact = artifact_in(&dir);
        let runner = MockRunner::with_exit_codes(&[255]);

        let err = run_transfer(&runner, &DeployConfig::default(), &artifact)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 255);
        assert_eq!(err.stage(), Some(Stage::Transfer));
    }
}
