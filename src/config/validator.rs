//! Config validation.
//!
//! Rejects values that would either be misparsed by the copy and shell
//! utilities or silently deploy to the wrong place.

use crate::error::ConfigError;
use crate::models::DeployConfig;
use crate::orchestrator::executor::is_shell_safe;
use std::collections::BTreeMap;
use std::path::Path;

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationFailed(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

/// A value passed as a single argument word: no whitespace, no leading '-'.
fn validate_word(field: &str, value: &str) -> Result<(), ConfigError> {
    require_non_empty(field, value)?;

    if value.chars().any(char::is_whitespace) {
        return Err(ConfigError::ValidationFailed(format!(
            "{} must not contain whitespace, got: '{}'",
            field, value
        )));
    }

    // Would be read as an option by scp/ssh
    if value.starts_with('-') {
        return Err(ConfigError::ValidationFailed(format!(
            "{} must not start with '-', got: '{}'",
            field, value
        )));
    }

    Ok(())
}

/// Validate the flash host name (an ssh destination, optionally `user@host`).
pub fn validate_host(host: &str) -> Result<(), ConfigError> {
    validate_word("Remote host", host)?;

    if host.contains(':') || host.contains('/') {
        return Err(ConfigError::ValidationFailed(format!(
            "Remote host must be a bare host name, got: '{}'",
            host
        )));
    }

    Ok(())
}

pub fn validate_chip_model(chip: &str) -> Result<(), ConfigError> {
    validate_word("Chip model", chip)
}

/// Validate the artifact path on the flash host (absolute file path).
///
/// Only shell-safe characters are accepted: scp may hand the path to the
/// remote shell unquoted while the flash command quotes it, and both must
/// resolve to the same file.
pub fn validate_remote_path(path: &str) -> Result<(), ConfigError> {
    require_non_empty("Remote artifact path", path)?;

    if !path.starts_with('/') {
        return Err(ConfigError::ValidationFailed(format!(
            "Remote artifact path must be absolute, got: '{}'",
            path
        )));
    }

    if path.chars().any(char::is_whitespace) {
        return Err(ConfigError::ValidationFailed(format!(
            "Remote artifact path must not contain whitespace, got: '{}'",
            path
        )));
    }

    if let Some(c) = path.chars().find(|c| !is_shell_safe(*c)) {
        return Err(ConfigError::ValidationFailed(format!(
            "Remote artifact path contains unsupported character '{}': '{}'",
            c, path
        )));
    }

    if path.ends_with('/') {
        return Err(ConfigError::ValidationFailed(format!(
            "Remote artifact path must name a file, not a directory: '{}'",
            path
        )));
    }

    Ok(())
}

/// The linker script is embedded in RUSTFLAGS, which is split on whitespace.
pub fn validate_linker_script(script: &str) -> Result<(), ConfigError> {
    require_non_empty("Linker script", script)?;

    if script.chars().any(char::is_whitespace) {
        return Err(ConfigError::ValidationFailed(format!(
            "Linker script path must not contain whitespace, got: '{}'",
            script
        )));
    }

    Ok(())
}

/// The local artifact is passed to the copy program as a string argument.
pub fn validate_local_artifact(path: &Path) -> Result<(), ConfigError> {
    if path.to_str().is_none() {
        return Err(ConfigError::ValidationFailed(format!(
            "Local artifact path is not valid UTF-8: '{}'",
            path.display()
        )));
    }
    Ok(())
}

/// Validate codegen options (keys become `-C key=value`).
pub fn validate_codegen_options(options: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for (key, value) in options {
        if key.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "Codegen option key cannot be empty".to_string(),
            ));
        }

        if key.chars().any(|c| c.is_whitespace() || c == '=') {
            return Err(ConfigError::ValidationFailed(format!(
                "Codegen option key '{}' must not contain whitespace or '='",
                key
            )));
        }

        if value.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationFailed(format!(
                "Codegen option '{}' has a value containing whitespace: '{}'",
                key, value
            )));
        }
    }

    Ok(())
}

/// Validate a complete configuration.
pub fn validate_config(config: &DeployConfig) -> Result<(), ConfigError> {
    let build = &config.build;
    validate_word("Target triple", &build.target_triple)?;
    validate_linker_script(&build.linker_script)?;
    require_non_empty("Binary name", &build.binary_name)?;
    validate_codegen_options(&build.codegen_options)?;
    validate_local_artifact(&build.artifact_path())?;

    validate_chip_model(&config.chip_model)?;
    validate_host(&config.remote.host)?;
    validate_remote_path(&config.remote.artifact_path)?;

    require_non_empty("Toolchain", &config.toolchain)?;
    require_non_empty("Copy program", &config.copy_program)?;
    require_non_empty("Shell program", &config.shell_program)?;
    require_non_empty("Flash tool program", &config.flash_tool.program)?;

    Ok(())
}
