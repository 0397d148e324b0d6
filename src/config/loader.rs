//! Config file loader and serialization.

use crate::error::ConfigError;
use crate::models::DeployConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "remote-flash.toml";

/// Get the per-user config path: ~/.config/remote-flash/remote-flash.toml
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("remote-flash").join(CONFIG_FILE_NAME))
}

/// Candidate config files in lookup order, excluding an explicit `--config`.
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(user) = user_config_path() {
        paths.push(user);
    }
    paths
}

/// Resolve which config file to load.
///
/// An explicit path always wins and must exist. Otherwise the first existing
/// search path is used, or `None` when defaults apply.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        validate_config_path(path)?;
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(format!(
                "Configuration file not found at: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(default_search_paths().into_iter().find(|p| p.is_file()))
}

/// Load config from TOML file.
pub fn load_config_from_file(path: &Path) -> Result<DeployConfig, ConfigError> {
    validate_config_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!(
                "Configuration file not found at: {}",
                path.display()
            ))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let config: DeployConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Load the effective base configuration (before command-line overrides).
///
/// Returns the config and the file it came from, if any.
pub fn load_effective(explicit: Option<&Path>) -> Result<(DeployConfig, Option<PathBuf>), ConfigError> {
    match resolve_config_path(explicit)? {
        Some(path) => {
            log::debug!("[Deploy] [CONFIG] Loading {}", path.display());
            let config = load_config_from_file(&path)?;
            Ok((config, Some(path)))
        }
        None => {
            log::debug!("[Deploy] [CONFIG] No config file found, using built-in defaults");
            Ok((DeployConfig::default(), None))
        }
    }
}

/// Save config to TOML file.
pub fn save_config_to_file(config: &DeployConfig, path: &Path) -> Result<(), ConfigError> {
    validate_config_path(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// Validate config path (.toml extension required).
pub fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "toml" => Ok(()),
        Some(ext) => Err(ConfigError::ValidationFailed(format!(
            "Configuration file must have .toml extension, got .{}",
            ext.to_string_lossy()
        ))),
        None => Err(ConfigError::ValidationFailed(
            "Configuration file must have .toml extension".to_string(),
        )),
    }
}
