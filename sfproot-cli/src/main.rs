//! sfproot CLI - Command-line tool for rooting and flashing Lantiq SFP modules.
//!
//! ## Features
//!
//! - Unlock the U-Boot console of a locked module
//! - Escalate the failsafe shell to a full root shell
//! - Switch the bootloader console baud rate
//! - Upload an image over YMODEM and commit it to a firmware bank
//! - Interactive serial port selection and a serial monitor
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use sfproot::{FirmwareBank, NativeTransport, SequenceResult, Sequencer};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

mod commands;
mod config;
mod reporter;
mod serial;

use config::Config;
use serial::{SerialOptions, select_serial_port};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors with a dedicated exit code.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Bad invocation or missing setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// The operator backed out (exit code 130).
    #[error("{0}")]
    Cancelled(String),
    /// A device sequence failed; the reporter has already shown it.
    #[error("{0}")]
    Sequence(sfproot::Error),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) | Self::Sequence(sfproot::Error::Interrupted) => 130,
            Self::Sequence(_) => 1,
        }
    }
}

/// Exit code for an error returned by a command.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    if matches!(
        err.downcast_ref::<sfproot::Error>(),
        Some(sfproot::Error::Interrupted)
    ) {
        return 130;
    }
    1
}

/// Turn a sequence outcome into a CLI result.
pub(crate) fn check(result: SequenceResult) -> Result<()> {
    result
        .into_result()
        .map_err(|e| CliError::Sequence(e).into())
}

/// sfproot - Unlock, root and flash Lantiq-based GPON SFP modules over their
/// serial console.
///
/// Environment variables:
///   SFPROOT_PORT              - Default serial port
///   SFPROOT_BAUD              - Console baud rate (default: 115200)
///   SFPROOT_MODEL             - Device name shown in instructions
///   SFPROOT_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "sfproot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  sfproot -p /dev/ttyUSB0 unlock\n  sfproot shell\n  sfproot flash image.bin --bank 1 --transfer-baud 460800")]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "SFPROOT_PORT")]
    port: Option<String>,

    /// Console baud rate [default: 115200].
    #[arg(short, long, global = true, env = "SFPROOT_BAUD")]
    baud: Option<u32>,

    /// Device name used in operator instructions.
    #[arg(long, global = true, env = "SFPROOT_MODEL")]
    model: Option<String>,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "SFPROOT_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Give up device waits after this many seconds (0 waits forever).
    #[arg(long, global = true, value_name = "SECS")]
    watchdog: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Halt autoboot and patch the bootloader environment until it stays unlocked.
    Unlock {
        /// Give up after this many patch cycles.
        #[arg(long, value_name = "N")]
        max_cycles: Option<u32>,
    },

    /// Boot into failsafe mode and enable a full root shell.
    Shell,

    /// Change the bootloader console baud rate.
    Baud {
        /// New baud rate.
        new: u32,
    },

    /// Load an image into RAM over YMODEM.
    Upload {
        /// Image file to send.
        image: PathBuf,

        /// Switch to this baud rate for the transfer.
        #[arg(long, value_name = "BAUD")]
        transfer_baud: Option<u32>,
    },

    /// Write the image in RAM to a firmware bank.
    Commit {
        /// Target bank (0 or 1).
        #[arg(long, value_parser = parse_bank)]
        bank: FirmwareBank,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Upload an image and commit it to a firmware bank.
    Flash {
        /// Image file to send.
        image: PathBuf,

        /// Target bank (0 or 1).
        #[arg(long, value_parser = parse_bank)]
        bank: FirmwareBank,

        /// Switch to this baud rate for the transfer.
        #[arg(long, value_name = "BAUD")]
        transfer_baud: Option<u32>,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Open an interactive serial console (Ctrl-] exits).
    Monitor {
        /// Baud rate for monitoring (default: 115200).
        #[arg(long, default_value = "115200")]
        monitor_baud: u32,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse a firmware bank index.
fn parse_bank(s: &str) -> Result<FirmwareBank, String> {
    let index: u8 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid bank: '{s}'. Expected 0 or 1"))?;
    FirmwareBank::from_index(index).ok_or_else(|| format!("Invalid bank: {index}. Expected 0 or 1"))
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Sequence failures were already printed by the reporter
            if !matches!(err.downcast_ref::<CliError>(), Some(CliError::Sequence(_))) {
                eprintln!("{} {err:#}", style("Error:").red().bold());
            }
            let code = if was_interrupted() {
                130
            } else {
                exit_code_for(&err)
            };
            ExitCode::from(code)
        },
    }
}

fn run() -> Result<()> {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "sfproot v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    install_interrupt_handler();

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Unlock { max_cycles } => commands::root::cmd_unlock(&cli, &config, *max_cycles),
        Commands::Shell => commands::root::cmd_shell(&cli, &config),
        Commands::Baud { new } => commands::root::cmd_baud(&cli, &config, *new),
        Commands::Upload {
            image,
            transfer_baud,
        } => commands::flash::cmd_upload(&cli, &config, image, *transfer_baud),
        Commands::Commit { bank, yes } => commands::flash::cmd_commit(&cli, &config, *bank, *yes),
        Commands::Flash {
            image,
            bank,
            transfer_baud,
            yes,
        } => commands::flash::cmd_flash(&cli, &config, image, *bank, *transfer_baud, *yes),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Monitor { monitor_baud } => {
            commands::monitor::cmd_monitor(&cli, &config, *monitor_baud)
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Route Ctrl-C to the library's interrupt checker.
///
/// A second Ctrl-C exits immediately.
fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
    });
    if let Err(e) = result {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    sfproot::set_interrupt_checker(was_interrupted);
}

/// Console baud rate: CLI/env, then config, then the bootloader default.
fn console_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.connection.baud)
        .unwrap_or(sfproot::port::DEFAULT_BAUD)
}

/// Get serial port from CLI args, config or interactive selection.
fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };
    select_serial_port(&options, config)
}

/// Build a sequencer for the selected port with the configured settings.
fn open_sequencer(
    cli: &Cli,
    config: &Config,
    max_cycles: Option<u32>,
) -> Result<Sequencer<NativeTransport>> {
    let port = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port).green(),
            console_baud(cli, config)
        );
    }

    let model = cli
        .model
        .clone()
        .or_else(|| {
            config
                .device
                .model
                .clone()
        })
        .unwrap_or_else(|| sfproot::sequence::DEFAULT_MODEL.to_string());

    Ok(Sequencer::new(NativeTransport::new(port))
        .with_timings(config.to_timings(cli.watchdog, max_cycles))
        .with_layout(config.to_layout())
        .with_model(model))
}
