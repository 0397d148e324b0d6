//! Phase 3: Flash - program the chip from the flash host.
//!
//! The flashing utility is started through a `RemoteExecutor`, attached to a
//! remote terminal by default so the operator sees probe output live. The
//! remote tool's exit code becomes the stage's exit code.

use crate::error::StageError;
use crate::models::{DeployConfig, FlashRequest, Stage};
use crate::orchestrator::executor::shell_quote;
use crate::orchestrator::remote::RemoteExecutor;

/// Remote command line for one flash, each word quoted for the remote shell.
pub fn flash_command_line(config: &DeployConfig, request: &FlashRequest) -> String {
    config
        .flash_tool
        .argv(request)
        .iter()
        .map(|word| shell_quote(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run the flash stage against the host named in the request.
pub async fn run_flash<X>(
    remote: &X,
    config: &DeployConfig,
    request: &FlashRequest,
) -> Result<(), StageError>
where
    X: RemoteExecutor + ?Sized,
{
    let command = flash_command_line(config, request);
    log::info!(
        "[Deploy] [FLASH] Chip {} on {} from {}",
        request.chip(),
        request.host(),
        request.artifact_path()
    );

    let result = remote
        .run(request.host(), &command, config.interactive)
        .await
        .map_err(|e| StageError::from_run_error(Stage::Flash, e))?;

    if !result.is_success() {
        log::error!(
            "[Deploy] [FLASH] Remote session exited with code {}",
            result.code
        );
        return Err(StageError::failed(Stage::Flash, result.code, result.diagnostics));
    }

    log::info!("[Deploy] [FLASH] Chip programmed");
    Ok(())
}
