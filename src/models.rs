//! Core data types for remote_flash.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// The three pipeline stages, in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Compile,
    Transfer,
    Flash,
}

impl Stage {
    /// All stages in execution order.
    pub const ORDER: [Stage; 3] = [Stage::Compile, Stage::Transfer, Stage::Flash];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Compile => "compile",
            Stage::Transfer => "transfer",
            Stage::Flash => "flash",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cargo build profile; selects the `target/<triple>/<profile>` directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    #[default]
    Debug,
    Release,
}

impl BuildProfile {
    /// Directory name cargo uses for this profile.
    pub fn dir_name(&self) -> &'static str {
        match self {
            BuildProfile::Debug => "debug",
            BuildProfile::Release => "release",
        }
    }
}

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Cross-module optimization mode requested from the toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationMode {
    /// `-C linker-plugin-lto`: defer optimization to the linker with whole-program visibility.
    #[default]
    LinkerPluginLto,
    None,
}

impl OptimizationMode {
    /// The compiler flag enabling this mode, if any.
    pub fn rustflag(&self) -> Option<&'static str> {
        match self {
            OptimizationMode::LinkerPluginLto => Some("-C linker-plugin-lto"),
            OptimizationMode::None => None,
        }
    }
}

impl fmt::Display for OptimizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationMode::LinkerPluginLto => write!(f, "linker-plugin-lto"),
            OptimizationMode::None => write!(f, "none"),
        }
    }
}

/// Everything the compile stage needs to produce the firmware image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfiguration {
    /// Target triple passed as `--target`
    pub target_triple: String,

    /// Linker script location, relative to the project root
    pub linker_script: String,

    pub optimization: OptimizationMode,

    pub profile: BuildProfile,

    /// Project root the toolchain runs in
    pub project_dir: PathBuf,

    /// Name of the produced binary under the target directory
    pub binary_name: String,

    /// Explicit artifact location; overrides the derived path when set
    pub local_artifact_path: Option<PathBuf>,

    /// Extra `-C key=value` codegen options, emitted sorted by key
    pub codegen_options: BTreeMap<String, String>,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        BuildConfiguration {
            target_triple: "thumbv7em-none-eabihf".to_string(),
            linker_script: "link.x".to_string(),
            optimization: OptimizationMode::LinkerPluginLto,
            profile: BuildProfile::Debug,
            project_dir: PathBuf::from("."),
            binary_name: "firmware".to_string(),
            local_artifact_path: None,
            codegen_options: BTreeMap::new(),
        }
    }
}

impl BuildConfiguration {
    /// Compiler flags scoped to the toolchain invocation (the `RUSTFLAGS` value).
    pub fn rustflags(&self) -> String {
        let mut flags = vec![format!("-C link-arg=-T{}", self.linker_script)];
        if let Some(lto) = self.optimization.rustflag() {
            flags.push(lto.to_string());
        }
        for (key, value) in &self.codegen_options {
            flags.push(format!("-C {}={}", key, value));
        }
        flags.join(" ")
    }

    /// Where the toolchain leaves the binary: `target/<triple>/<profile>/<binary>`.
    pub fn artifact_path(&self) -> PathBuf {
        match &self.local_artifact_path {
            Some(path) => path.clone(),
            None => self
                .project_dir
                .join("target")
                .join(&self.target_triple)
                .join(self.profile.dir_name())
                .join(&self.binary_name),
        }
    }
}

/// Compiled firmware image on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Artifact { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The flash host and the fixed location the artifact is copied to.
///
/// A single value is shared by the transfer and the flash stage, so both
/// always address the same machine and the same file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteEndpoint {
    /// SSH host alias or address
    pub host: String,

    /// Absolute destination path on the host
    pub artifact_path: String,
}

impl Default for RemoteEndpoint {
    fn default() -> Self {
        RemoteEndpoint {
            host: "buildhost".to_string(),
            artifact_path: "/tmp/firmware.elf".to_string(),
        }
    }
}

impl RemoteEndpoint {
    /// `host:path` destination spec understood by scp.
    pub fn scp_destination(&self) -> String {
        format!("{}:{}", self.host, self.artifact_path)
    }
}

/// Proof that the artifact now resides on the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    endpoint: RemoteEndpoint,
    local_path: PathBuf,
}

impl TransferReceipt {
    pub(crate) fn new(endpoint: RemoteEndpoint, local_path: PathBuf) -> Self {
        TransferReceipt {
            endpoint,
            local_path,
        }
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }
}

/// Parameters for the remote flashing utility.
///
/// Only constructible from a [`TransferReceipt`], so host and path are exactly
/// the ones the artifact was copied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashRequest {
    host: String,
    chip: String,
    artifact_path: String,
}

impl FlashRequest {
    pub fn from_receipt(receipt: &TransferReceipt, chip: &str) -> Self {
        FlashRequest {
            host: receipt.endpoint.host.clone(),
            chip: chip.to_string(),
            artifact_path: receipt.endpoint.artifact_path.clone(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn chip(&self) -> &str {
        &self.chip
    }

    pub fn artifact_path(&self) -> &str {
        &self.artifact_path
    }
}

/// The flashing utility installed on the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashTool {
    pub program: String,

    /// Flag preceding the chip model, e.g. `--chip`
    pub chip_flag: String,

    /// Extra arguments placed before the chip flag
    pub extra_args: Vec<String>,
}

impl Default for FlashTool {
    fn default() -> Self {
        FlashTool {
            program: "probe-run".to_string(),
            chip_flag: "--chip".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl FlashTool {
    /// Argument vector for one flash invocation (program first).
    pub fn argv(&self, request: &FlashRequest) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend(self.extra_args.iter().cloned());
        argv.push(self.chip_flag.clone());
        argv.push(request.chip.clone());
        argv.push(request.artifact_path.clone());
        argv
    }
}

/// Complete configuration for one deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Chip model identifier handed to the flashing utility
    pub chip_model: String,

    /// Open an interactive terminal for the flash session
    pub interactive: bool,

    /// Cross-compilation toolchain driver
    pub toolchain: String,

    /// Secure copy utility
    pub copy_program: String,

    /// Remote shell session utility
    pub shell_program: String,

    /// `-o` options passed to both the copy and the shell utility
    pub ssh_options: Vec<String>,

    pub build: BuildConfiguration,

    pub remote: RemoteEndpoint,

    pub flash_tool: FlashTool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        DeployConfig {
            chip_model: "nRF52840_xxAA".to_string(),
            interactive: true,
            toolchain: "cargo".to_string(),
            copy_program: "scp".to_string(),
            shell_program: "ssh".to_string(),
            ssh_options: Vec::new(),
            build: BuildConfiguration::default(),
            remote: RemoteEndpoint::default(),
            flash_tool: FlashTool::default(),
        }
    }
}
