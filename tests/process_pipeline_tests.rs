//! End-to-end pipeline runs against real child processes.
//!
//! The toolchain, copy and shell utilities are replaced by small shell
//! scripts that record their arguments and environment, so the whole flow
//! runs through `ProcessRunner` and `SshExecutor` without network or probe.
#![cfg(unix)]

use remote_flash::error::EXIT_SPAWN;
use remote_flash::{
    DeployConfig, DeployOrchestrator, LogCollector, PipelineState, ProcessRunner, SshExecutor,
    Stage,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Fake toolchain that records RUSTFLAGS and produces the artifact,
/// fake scp/ssh that record their argv and exit with `ssh_exit`.
fn setup(dir: &TempDir, ssh_exit: i32) -> DeployConfig {
    let root = dir.path();
    let mut config = DeployConfig::default();
    config.build.project_dir = root.to_path_buf();
    config.build.binary_name = "fw.bin".to_string();
    config.chip_model = "chipX".to_string();
    config.remote.artifact_path = "/tmp/fw.bin".to_string();
    config.interactive = false;

    let artifact = config.build.artifact_path();
    let toolchain = write_script(
        root,
        "fake-cargo",
        &format!(
            "echo \"$RUSTFLAGS\" > {rec}/rustflags\necho \"   Compiling fw v0.1.0\"\nmkdir -p {dir}\ntouch {art}",
            rec = root.display(),
            dir = artifact.parent().unwrap().display(),
            art = artifact.display()
        ),
    );
    let copy = write_script(
        root,
        "fake-scp",
        &format!("echo \"$@\" > {}/scp-args", root.display()),
    );
    let shell = write_script(
        root,
        "fake-ssh",
        &format!("echo \"$@\" > {}/ssh-args\nexit {}", root.display(), ssh_exit),
    );

    config.toolchain = toolchain.to_string_lossy().into_owned();
    config.copy_program = copy.to_string_lossy().into_owned();
    config.shell_program = shell.to_string_lossy().into_owned();
    config
}

fn orchestrator(
    config: DeployConfig,
    collector: Option<Arc<LogCollector>>,
) -> (watch::Sender<bool>, DeployOrchestrator<ProcessRunner, SshExecutor<ProcessRunner>>) {
    let (tx, rx) = watch::channel(false);
    let runner = ProcessRunner::new(rx.clone(), collector.clone());
    let remote = SshExecutor::new(
        ProcessRunner::new(rx, collector),
        config.shell_program.clone(),
        config.ssh_options.clone(),
    );
    (tx, DeployOrchestrator::new(config, runner, remote))
}

#[tokio::test]
async fn test_real_processes_full_pipeline() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir, 0);
    let artifact = config.build.artifact_path();
    let (_tx, orch) = orchestrator(config, None);

    orch.run().await.unwrap();
    assert_eq!(orch.current_state().await, PipelineState::Succeeded);

    let rustflags = fs::read_to_string(dir.path().join("rustflags")).unwrap();
    assert_eq!(rustflags.trim(), "-C link-arg=-Tlink.x -C linker-plugin-lto");
    // Scoped to the child
    assert!(std::env::var("RUSTFLAGS").map_or(true, |v| v != rustflags.trim()));

    let scp_args = fs::read_to_string(dir.path().join("scp-args")).unwrap();
    assert_eq!(
        scp_args.trim(),
        format!("{} buildhost:/tmp/fw.bin", artifact.display())
    );

    let ssh_args = fs::read_to_string(dir.path().join("ssh-args")).unwrap();
    assert_eq!(ssh_args.trim(), "buildhost probe-run --chip chipX /tmp/fw.bin");
}

#[tokio::test]
async fn test_real_processes_remote_exit_code() {
    let dir = TempDir::new().unwrap();
    let (_tx, orch) = orchestrator(setup(&dir, 3), None);

    let err = orch.run().await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert_eq!(err.stage(), Some(Stage::Flash));
}

#[tokio::test]
async fn test_missing_toolchain_binary() {
    let dir = TempDir::new().unwrap();
    let mut config = setup(&dir, 0);
    config.toolchain = dir.path().join("no-such-cargo").to_string_lossy().into_owned();
    let (_tx, orch) = orchestrator(config, None);

    let err = orch.run().await.unwrap_err();
    assert_eq!(err.exit_code(), EXIT_SPAWN);
    assert!(!dir.path().join("scp-args").exists());
}

#[tokio::test]
async fn test_toolchain_output_reaches_session_log() {
    let dir = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
    let collector = Arc::new(
        LogCollector::new(logs.path(), log::LevelFilter::Info)
            .unwrap()
            .without_echo(),
    );
    let (_tx, orch) = orchestrator(setup(&dir, 0), Some(Arc::clone(&collector)));
    let orch = orch.with_log_collector(Arc::clone(&collector));

    orch.run().await.unwrap();
    collector.wait_for_empty().await.unwrap();

    let full = fs::read_to_string(collector.full_log_path()).unwrap();
    let parsed = fs::read_to_string(collector.parsed_log_path()).unwrap();
    assert!(full.contains("Compiling fw v0.1.0"));
    assert!(parsed.contains("Compiling fw v0.1.0"));
    assert!(parsed.contains("STATE TRANSITION: flashing -> succeeded"));
}
