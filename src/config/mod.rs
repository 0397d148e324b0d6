//! Configuration for firmware deployments.
//!
//! # Module Structure
//!
//! - `loader`: locating, reading and writing TOML config files
//! - `validator`: field-level checks run on the effective configuration
//!
//! # Configuration Flow
//!
//! 1. `loader` finds a config file (`--config`, working directory, user config dir)
//!    or falls back to built-in defaults
//! 2. `ConfigOverrides` applies command-line flags on top
//! 3. `validator` checks the merged result before anything is executed

pub mod loader;
pub mod validator;

use crate::error::ConfigError;
use crate::models::{BuildProfile, DeployConfig, OptimizationMode};
use std::path::{Path, PathBuf};

/// Command-line overrides layered over the loaded configuration.
///
/// `None` / `false` / empty leaves the loaded value untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub target_triple: Option<String>,
    pub chip_model: Option<String>,
    pub host: Option<String>,
    pub remote_path: Option<String>,
    pub artifact: Option<PathBuf>,
    pub linker_script: Option<String>,
    pub no_lto: bool,
    pub release: bool,
    pub project_dir: Option<PathBuf>,
    pub binary_name: Option<String>,

    /// `KEY=VALUE` pairs, merged into the codegen options
    pub codegen: Vec<String>,

    /// Appended after the options from the config file
    pub ssh_options: Vec<String>,

    pub non_interactive: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut DeployConfig) -> Result<(), ConfigError> {
        let build = &mut config.build;
        if let Some(ref triple) = self.target_triple {
            build.target_triple = triple.clone();
        }
        if let Some(ref script) = self.linker_script {
            build.linker_script = script.clone();
        }
        if let Some(ref dir) = self.project_dir {
            build.project_dir = dir.clone();
        }
        if let Some(ref name) = self.binary_name {
            build.binary_name = name.clone();
        }
        if let Some(ref artifact) = self.artifact {
            build.local_artifact_path = Some(artifact.clone());
        }
        if self.no_lto {
            build.optimization = OptimizationMode::None;
        }
        if self.release {
            build.profile = BuildProfile::Release;
        }
        for pair in &self.codegen {
            let (key, value) = parse_codegen_option(pair)?;
            build.codegen_options.insert(key, value);
        }

        if let Some(ref chip) = self.chip_model {
            config.chip_model = chip.clone();
        }
        if let Some(ref host) = self.host {
            config.remote.host = host.clone();
        }
        if let Some(ref path) = self.remote_path {
            config.remote.artifact_path = path.clone();
        }
        config.ssh_options.extend(self.ssh_options.iter().cloned());
        if self.non_interactive {
            config.interactive = false;
        }
        Ok(())
    }
}

/// Split a `KEY=VALUE` codegen flag at the first '='.
pub fn parse_codegen_option(pair: &str) -> Result<(String, String), ConfigError> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(ConfigError::ValidationFailed(format!(
            "Codegen option must be KEY=VALUE, got: '{}'",
            pair
        ))),
    }
}

/// Load, override and validate: the configuration a run will use.
pub fn load_config(
    explicit: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<DeployConfig, ConfigError> {
    let (mut config, source) = loader::load_effective(explicit)?;
    overrides.apply(&mut config)?;
    validator::validate_config(&config)?;

    match source {
        Some(path) => log::info!("[Deploy] [CONFIG] Using {}", path.display()),
        None => log::info!("[Deploy] [CONFIG] Using built-in defaults"),
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_replace_loaded_values() {
        let mut config = DeployConfig::default();
        config.ssh_options = vec!["Port=2222".into()];
        let overrides = ConfigOverrides {
            target_triple: Some("armv7e-m-none-eabihf".into()),
            chip_model: Some("chipX".into()),
            host: Some("buildhost".into()),
            remote_path: Some("/tmp/fw.bin".into()),
            no_lto: true,
            release: true,
            codegen: vec!["opt-level=s".into()],
            ssh_options: vec!["BatchMode=yes".into()],
            non_interactive: true,
            ..Default::default()
        };

        overrides.apply(&mut config).unwrap();
        assert_eq!(config.build.target_triple, "armv7e-m-none-eabihf");
        assert_eq!(config.chip_model, "chipX");
        assert_eq!(config.remote.scp_destination(), "buildhost:/tmp/fw.bin");
        assert_eq!(config.build.optimization, OptimizationMode::None);
        assert_eq!(config.build.profile, BuildProfile::Release);
        assert_eq!(config.build.codegen_options["opt-level"], "s");
        assert_eq!(config.ssh_options, vec!["Port=2222", "BatchMode=yes"]);
        assert!(!config.interactive);
    }

    #[test]
    fn test_empty_overrides_change_nothing() {
        let mut config = DeployConfig::default();
        ConfigOverrides::default().apply(&mut config).unwrap();
        assert_eq!(config, DeployConfig::default());
    }

    #[test]
    fn test_parse_codegen_option() {
        assert_eq!(
            parse_codegen_option("target-cpu=cortex-m4").unwrap(),
            ("target-cpu".to_string(), "cortex-m4".to_string())
        );
        assert_eq!(
            parse_codegen_option("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
        assert!(parse_codegen_option("novalue").is_err());
        assert!(parse_codegen_option("=x").is_err());
    }

    #[test]
    fn test_load_config_validates_after_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deploy.toml");
        fs::write(&path, "[remote]\nhost = \"lab-pi\"\n").unwrap();

        let bad = ConfigOverrides {
            remote_path: Some("relative/fw.bin".into()),
            ..Default::default()
        };
        assert!(matches!(
            load_config(Some(&path), &bad),
            Err(ConfigError::ValidationFailed(_))
        ));

        let config = load_config(Some(&path), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.remote.host, "lab-pi");
    }
}
