//! Upload, commit, and flash command implementations.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use sfproot::{FirmwareBank, NativeTransport, Sequencer, Ymodem};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::reporter::ConsoleReporter;
use crate::serial::{ensure_interactive_terminal, map_prompt_error};
use crate::{Cli, CliError, check, console_baud, open_sequencer, use_fancy_output, was_interrupted};

fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

/// Read the image file and the name announced to the receiver.
fn load_image(image: &Path) -> Result<(String, Vec<u8>)> {
    let data =
        fs::read(image).with_context(|| format!("Failed to read image {}", image.display()))?;
    if data.is_empty() {
        return Err(CliError::Usage(format!("Image {} is empty", image.display())).into());
    }
    let name = image
        .file_name()
        .map_or_else(|| "image.bin".to_string(), |n| n.to_string_lossy().into_owned());
    Ok((name, data))
}

/// Ask before overwriting a firmware bank.
fn confirm_commit(cli: &Cli, bank: FirmwareBank, yes: bool) -> Result<()> {
    if yes {
        return Ok(());
    }
    if cli.non_interactive {
        return Err(CliError::Usage(format!(
            "Writing {bank} needs confirmation; pass --yes in non-interactive mode"
        ))
        .into());
    }
    ensure_interactive_terminal()?;

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Erase and rewrite {bank} on the device?"))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(())
    } else {
        Err(CliError::Cancelled("flash cancelled".to_string()).into())
    }
}

/// Send `image` into RAM, switching to `transfer_baud` first if asked.
///
/// Returns the baud rate the console is left at.
fn upload(
    cli: &Cli,
    config: &Config,
    sequencer: &mut Sequencer<NativeTransport>,
    reporter: &mut ConsoleReporter,
    image: &Path,
    transfer_baud: Option<u32>,
) -> Result<u32> {
    let (name, data) = load_image(image)?;
    let current = console_baud(cli, config);
    let baud = transfer_baud.unwrap_or(current);

    if baud != current {
        check(sequencer.change_baud(current, baud, reporter))?;
        ensure_not_interrupted()?;
    }

    check(sequencer.send_image(baud, &Ymodem::default(), &name, &data, reporter))?;
    ensure_not_interrupted()?;
    check(sequencer.wait_image_loaded(baud, reporter))?;
    Ok(baud)
}

/// Upload command implementation.
pub(crate) fn cmd_upload(
    cli: &Cli,
    config: &Config,
    image: &Path,
    transfer_baud: Option<u32>,
) -> Result<()> {
    let mut sequencer = open_sequencer(cli, config, None)?;
    let mut reporter = ConsoleReporter::new(cli.quiet, use_fancy_output());

    let baud = upload(cli, config, &mut sequencer, &mut reporter, image, transfer_baud)?;
    if !cli.quiet {
        eprintln!(
            "\n{} Image loaded at 0x{:X} (console at {baud} baud)",
            style("✓").green().bold(),
            sequencer
                .layout()
                .ram_load_addr
        );
    }
    Ok(())
}

/// Commit command implementation.
pub(crate) fn cmd_commit(cli: &Cli, config: &Config, bank: FirmwareBank, yes: bool) -> Result<()> {
    confirm_commit(cli, bank, yes)?;
    let mut sequencer = open_sequencer(cli, config, None)?;
    let mut reporter = ConsoleReporter::new(cli.quiet, use_fancy_output());

    check(sequencer.commit_bank(console_baud(cli, config), bank, &mut reporter))?;
    if !cli.quiet {
        eprintln!("\n{} {bank} flashed", style("🎉").green().bold());
    }
    Ok(())
}

/// Flash command implementation: upload, then commit.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    image: &Path,
    bank: FirmwareBank,
    transfer_baud: Option<u32>,
    yes: bool,
) -> Result<()> {
    // Fail on a bad image before touching the device
    load_image(image)?;
    confirm_commit(cli, bank, yes)?;

    let mut sequencer = open_sequencer(cli, config, None)?;
    let mut reporter = ConsoleReporter::new(cli.quiet, use_fancy_output());

    let baud = upload(cli, config, &mut sequencer, &mut reporter, image, transfer_baud)?;
    ensure_not_interrupted()?;
    check(sequencer.commit_bank(baud, bank, &mut reporter))?;

    if !cli.quiet {
        eprintln!("\n{} {bank} flashed", style("🎉").green().bold());
    }
    Ok(())
}
