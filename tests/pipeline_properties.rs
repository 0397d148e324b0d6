//! Property tests over valid deployment configurations.

use proptest::prelude::*;
use remote_flash::config::validator::validate_config;
use remote_flash::{
    DeployConfig, DeployOrchestrator, MockRemoteExecutor, MockRunner, OptimizationMode, Stage,
};
use std::fs;
use tempfile::TempDir;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

prop_compose! {
    fn valid_config()(
        triple in "(thumbv7em|thumbv6m|armv7e-m|riscv32imac)-none-(eabihf|eabi|elf)",
        chip in "[A-Za-z][A-Za-z0-9_]{0,15}",
        host in "[a-z][a-z0-9-]{0,15}",
        remote_path in "/[a-z0-9_]{1,8}(/[a-z0-9_.]{1,8}){0,3}",
        lto in any::<bool>(),
        opt_level in proptest::option::of("[0-3sz]"),
    ) -> DeployConfig {
        let mut config = DeployConfig::default();
        config.build.target_triple = triple;
        config.build.optimization = if lto {
            OptimizationMode::LinkerPluginLto
        } else {
            OptimizationMode::None
        };
        if let Some(level) = opt_level {
            config.build.codegen_options.insert("opt-level".to_string(), level);
        }
        config.chip_model = chip;
        config.remote.host = host;
        config.remote.artifact_path = remote_path;
        config
    }
}

/// Point the config at an existing artifact so the transfer precondition holds.
fn with_artifact(mut config: DeployConfig, dir: &TempDir) -> DeployConfig {
    let artifact = dir.path().join("fw.bin");
    fs::write(&artifact, b"image").expect("Failed to write artifact");
    config.build.local_artifact_path = Some(artifact);
    config
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generated_configs_are_valid(config in valid_config()) {
        prop_assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn failure_in_stage_stops_pipeline(
        config in valid_config(),
        failing in 0usize..3,
        code in 1i32..=255,
    ) {
        let dir = TempDir::new().unwrap();
        let config = with_artifact(config, &dir);

        let runner = match failing {
            0 => MockRunner::with_exit_codes(&[code]),
            1 => MockRunner::with_exit_codes(&[0, code]),
            _ => MockRunner::new(),
        };
        let remote = if failing == 2 {
            MockRemoteExecutor::with_exit_codes(&[code])
        } else {
            MockRemoteExecutor::new()
        };
        let orch = DeployOrchestrator::new(config, runner.clone(), remote.clone());

        let err = runtime().block_on(orch.run()).unwrap_err();
        prop_assert_eq!(err.exit_code(), code);
        prop_assert_eq!(err.stage(), Some(Stage::ORDER[failing]));

        let state = runtime().block_on(orch.state_snapshot());
        prop_assert_eq!(state.invoked_stages(), Stage::ORDER[..=failing].to_vec());
        prop_assert_eq!(runner.invocations().len(), failing.min(1) + 1);
        prop_assert_eq!(remote.calls().len(), usize::from(failing == 2));
    }

    #[test]
    fn successful_run_flashes_transfer_destination(config in valid_config()) {
        let dir = TempDir::new().unwrap();
        let config = with_artifact(config, &dir);
        let expected_destination = config.remote.scp_destination();
        let chip = config.chip_model.clone();

        let runner = MockRunner::new();
        let remote = MockRemoteExecutor::new();
        let orch = DeployOrchestrator::new(config, runner.clone(), remote.clone());
        prop_assert!(runtime().block_on(orch.run()).is_ok());

        let invocations = runner.invocations();
        prop_assert_eq!(invocations[1].args.last(), Some(&expected_destination));

        let calls = remote.calls();
        prop_assert_eq!(calls.len(), 1);
        let (host, path) = expected_destination.split_once(':').unwrap();
        prop_assert_eq!(calls[0].host.as_str(), host);
        let expected_command = format!("probe-run --chip {} {}", chip, path);
        prop_assert_eq!(calls[0].command.as_str(), expected_command.as_str());
    }

    #[test]
    fn rustflags_carry_linker_script_first(config in valid_config()) {
        let flags = config.build.rustflags();
        prop_assert!(flags.starts_with("-C link-arg=-Tlink.x"));
        prop_assert_eq!(
            flags.contains("-C linker-plugin-lto"),
            config.build.optimization == OptimizationMode::LinkerPluginLto
        );
    }
}
