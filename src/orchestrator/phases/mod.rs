//! Orchestrator phases: the three pipeline stages.
//!
//! - **Compile** (`compile`) - cross-compile the firmware image with scoped compiler flags
//! - **Transfer** (`transfer`) - copy the image to the flash host
//! - **Flash** (`flash`) - program the chip through a remote session
//!
//! Each phase builds its command from the configuration alone, so the dry-run
//! plan and the real run always agree, and each is testable with a mock runner.

pub mod compile;
pub mod flash;
pub mod transfer;

pub use compile::{compile_command, run_compile};
pub use flash::{flash_command_line, run_flash};
pub use transfer::{check_artifact, run_transfer, transfer_command};
