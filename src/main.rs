//! ESP-Forge - flash firmware to Espressif boards and watch their serial output
//!
//! Main entry point for the console application.
//!
//! # Overview
//!
//! This binary parses the command line and wires up:
//! - Configuration loading ([`ConfigManager`], `ESP-Forge Data/ESP-Forge Settings.yaml`)
//! - Logging infrastructure (daily rotating file, optional stderr output)
//! - Tokio runtime for the flashing-tool subprocess pump
//! - State management ([`StateManager`]) and pipeline [`Metrics`]
//! - The console front end ([`ConsoleController`])
//!
//! # Execution Flow
//!
//! 1. Parse arguments and load settings (file, then `ESPFORGE_*` overrides)
//! 2. Initialize logging → `<log_dir>/espforge.<date>`
//! 3. Create the tokio runtime
//! 4. Run one command to completion on the runtime
//! 5. Log the metrics summary and exit with the command's exit code
//!
//! # Commands
//!
//! - `flash`: write up to 8 `ADDR=PATH` images, optionally from a saved profile
//! - `erase`: erase the entire flash (asks first unless `--yes`)
//! - `chip-info`: print the chip id
//! - `monitor`: serial terminal; stdin lines are sent, Ctrl-C or EOF exits

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use espforge::config::DEFAULT_CONFIG_DIR;
use espforge::logging::{self, LOG_PREFIX};
use espforge::models::{ChipType, FlashBaud, parse_address};
use espforge::services::SystemPortOpener;
use espforge::ui::{
    CommandOutcome, ConsoleController, FlashRequest, MonitorRequest, spawn_stdin_lines,
};
use espforge::{APP_NAME, ConfigManager, Metrics, StateManager, VERSION};
use std::io::{self, Stdout};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "espforge", author, version, about, long_about = None)]
struct Cli {
    /// Directory holding ESP-Forge Settings.yaml
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_DIR)]
    config_dir: Utf8PathBuf,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Mirror log output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TargetArgs {
    /// Serial port of the board (e.g. COM3, /dev/ttyUSB0)
    #[arg(short, long)]
    port: String,

    /// Chip family; defaults to the configured default_chip
    #[arg(short, long)]
    chip: Option<ChipType>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write one or more images to flash
    Flash {
        #[command(flatten)]
        target: TargetArgs,

        /// Flash baud rate: 115200, 230400, 460800 or 921600
        #[arg(short, long)]
        baud: Option<FlashBaud>,

        /// Load chip, baud and files from a saved profile
        #[arg(long, value_name = "FILE")]
        profile: Option<Utf8PathBuf>,

        /// Image to write, repeatable (e.g. --file 0x10000=app.bin)
        #[arg(short, long = "file", value_name = "ADDR=PATH", value_parser = parse_file_arg)]
        files: Vec<(String, String)>,

        /// Save the resulting chip, baud and files as a profile
        #[arg(long, value_name = "FILE")]
        save_profile: Option<Utf8PathBuf>,
    },
    /// Erase the entire flash
    Erase {
        #[command(flatten)]
        target: TargetArgs,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Read the chip id
    ChipInfo {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Open a serial terminal
    Monitor {
        /// Serial port of the board
        #[arg(short, long)]
        port: String,

        /// Monitor baud rate; defaults to the configured monitor_baud
        #[arg(short, long)]
        baud: Option<u32>,

        /// Print received lines without a timestamp
        #[arg(long)]
        no_timestamps: bool,

        /// Write the monitor transcript to FILE on exit
        #[arg(long, value_name = "FILE")]
        save_log: Option<Utf8PathBuf>,
    },
}

/// Parse `ADDR=PATH`, checking the address up front.
fn parse_file_arg(s: &str) -> Result<(String, String), String> {
    let (addr, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ADDR=PATH, got '{}'", s))?;
    parse_address(addr).map_err(|e| e.to_string())?;
    if path.trim().is_empty() {
        return Err(format!("missing path in '{}'", s));
    }
    Ok((addr.trim().to_string(), path.trim().to_string()))
}

async fn dispatch(
    controller: &mut ConsoleController<Stdout>,
    command: Commands,
    timestamps_default: bool,
) -> Result<CommandOutcome> {
    match command {
        Commands::Flash {
            target,
            baud,
            profile,
            files,
            save_profile,
        } => {
            controller
                .flash(FlashRequest {
                    port: target.port,
                    chip: target.chip,
                    baud,
                    profile,
                    files,
                    save_profile,
                })
                .await
        }
        Commands::Erase { target, yes } => {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            controller
                .erase(&target.port, target.chip, yes, &mut input)
                .await
        }
        Commands::ChipInfo { target } => controller.chip_info(&target.port, target.chip).await,
        Commands::Monitor {
            port,
            baud,
            no_timestamps,
            save_log,
        } => {
            controller
                .monitor(
                    MonitorRequest {
                        port,
                        baud,
                        timestamps: timestamps_default && !no_timestamps,
                        save_log,
                    },
                    spawn_stdin_lines(),
                )
                .await
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Settings decide where logs go, so they load first
    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let settings = config_manager.load_settings()?;

    let _log_guard = logging::setup_logging_with_console(
        &settings.log_dir,
        LOG_PREFIX,
        cli.debug || settings.debug_mode,
        cli.verbose,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("espforge-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let state_manager = StateManager::new();
    let timestamps_default = settings.timestamps;

    let result = runtime.block_on(async {
        let mut controller = ConsoleController::new(
            settings,
            config_manager,
            state_manager,
            Arc::clone(&metrics),
            tokio::runtime::Handle::current(),
            Arc::new(SystemPortOpener),
            io::stdout(),
        );
        dispatch(&mut controller, cli.command, timestamps_default).await
    });

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(2));

    match result {
        Ok(outcome) => {
            tracing::info!("Command finished: {:?}", outcome);
            Ok(ExitCode::from(outcome.exit_code()))
        }
        Err(e) => {
            tracing::error!("Command failed: {:#}", e);
            Err(e)
        }
    }
}
