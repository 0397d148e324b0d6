use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use tokio::sync::watch;

use remote_flash::config::loader;
use remote_flash::error::{EXIT_CONFIG, EXIT_INTERNAL};
use remote_flash::log_collector::default_logs_path;
use remote_flash::{
    load_config, ConfigOverrides, DeployOrchestrator, LogCollector, ProcessRunner, SshExecutor,
};

#[derive(Parser, Debug)]
#[command(
    name = "remote-flash",
    version,
    about = "Cross-compile firmware, copy it to a probe host and flash it there."
)]
struct Cli {
    /// Config file (TOML). Defaults to ./remote-flash.toml, then the user config dir
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Target triple to cross-compile for
    #[arg(long, value_name = "TRIPLE")]
    target: Option<String>,

    /// Chip model handed to the flashing utility
    #[arg(long)]
    chip: Option<String>,

    /// Host the probe is attached to
    #[arg(long)]
    host: Option<String>,

    /// Absolute artifact path on the remote host
    #[arg(long, value_name = "PATH")]
    remote_path: Option<String>,

    /// Local artifact path, instead of the one derived from target and profile
    #[arg(long, value_name = "PATH")]
    artifact: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    linker_script: Option<String>,

    /// Disable linker-plugin LTO
    #[arg(long)]
    no_lto: bool,

    #[arg(long)]
    release: bool,

    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Binary name under the target directory
    #[arg(long = "bin", value_name = "NAME")]
    binary_name: Option<String>,

    /// Extra codegen option, passed as `-C KEY=VALUE` (repeatable)
    #[arg(long, value_name = "KEY=VALUE")]
    codegen: Vec<String>,

    /// `-o` option for scp and ssh (repeatable)
    #[arg(long = "ssh-option", value_name = "OPT")]
    ssh_options: Vec<String>,

    /// Run the flash session without a remote terminal
    #[arg(long)]
    non_interactive: bool,

    /// Print the commands that would run, then exit
    #[arg(long)]
    dry_run: bool,

    /// Write the run report (JSON) to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Directory for session logs (default ./logs)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the effective configuration to a TOML file
    InitConfig {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

impl Cli {
    fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        }
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            target_triple: self.target.clone(),
            chip_model: self.chip.clone(),
            host: self.host.clone(),
            remote_path: self.remote_path.clone(),
            artifact: self.artifact.clone(),
            linker_script: self.linker_script.clone(),
            no_lto: self.no_lto,
            release: self.release,
            project_dir: self.project_dir.clone(),
            binary_name: self.binary_name.clone(),
            codegen: self.codegen.clone(),
            ssh_options: self.ssh_options.clone(),
            non_interactive: self.non_interactive,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[Main] ✗ {:#}", e);
            EXIT_INTERNAL
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let log_dir = match cli.log_dir.clone() {
        Some(dir) => dir,
        None => default_logs_path().map_err(anyhow::Error::msg)?,
    };
    let collector = LogCollector::new(&log_dir, cli.level())
        .map_err(anyhow::Error::msg)
        .context("LogCollector initialization failed")?;
    collector
        .install()
        .context("Failed to register LogCollector as global logger")?;
    let collector = Arc::new(collector);
    log::debug!(
        "[Main] Session log: {}",
        collector.full_log_path().display()
    );

    let code = execute(&cli, &collector).await;

    if let Err(e) = collector.wait_for_empty().await {
        eprintln!("[Main] WARNING: log flush failed: {}", e);
    }
    Ok(code)
}

/// Run the selected command and return the process exit code.
async fn execute(cli: &Cli, collector: &Arc<LogCollector>) -> i32 {
    let config = match load_config(cli.config.as_deref(), &cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("[Deploy] [CONFIG] {}", e);
            return EXIT_CONFIG;
        }
    };

    if let Some(Commands::InitConfig { ref path }) = cli.command {
        if let Err(e) = loader::save_config_to_file(&config, path) {
            log::error!("[Deploy] [CONFIG] {}", e);
            return EXIT_CONFIG;
        }
        log::info!("[Deploy] [CONFIG] Wrote {}", path.display());
        return 0;
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("[Main] Interrupt received, stopping the running stage");
            let _ = cancel_tx.send(true);
        }
    });

    let runner = ProcessRunner::new(cancel_rx.clone(), Some(Arc::clone(collector)));
    let remote = SshExecutor::new(
        ProcessRunner::new(cancel_rx, Some(Arc::clone(collector))),
        config.shell_program.clone(),
        config.ssh_options.clone(),
    );
    let orchestrator =
        DeployOrchestrator::new(config, runner, remote).with_log_collector(Arc::clone(collector));

    if cli.dry_run {
        for spec in orchestrator.plan() {
            println!("{}", spec);
        }
        return 0;
    }

    let code = match orchestrator.run().await {
        Ok(()) => 0,
        Err(e) => e.exit_code(),
    };

    // The pipeline outcome stands even if the report cannot be written
    if let Some(ref path) = cli.report {
        match orchestrator.write_report(path).await {
            Ok(()) => log::info!("[Deploy] Report written to {}", path.display()),
            Err(e) => log::warn!(
                "[Deploy] Failed to write report to {}: {}",
                path.display(),
                e
            ),
        }
    }

    code
}
