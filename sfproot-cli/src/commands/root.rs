//! Unlock, shell escalation and baud change commands.

use anyhow::Result;
use console::style;

use crate::config::Config;
use crate::reporter::ConsoleReporter;
use crate::{Cli, check, console_baud, open_sequencer, use_fancy_output};

fn done(cli: &Cli, message: &str) {
    if !cli.quiet {
        eprintln!("\n{} {message}", style("✓").green().bold());
    }
}

/// Unlock command implementation.
pub(crate) fn cmd_unlock(cli: &Cli, config: &Config, max_cycles: Option<u32>) -> Result<()> {
    let mut sequencer = open_sequencer(cli, config, max_cycles)?;
    let mut reporter = ConsoleReporter::new(cli.quiet, use_fancy_output());

    check(sequencer.unlock(console_baud(cli, config), &mut reporter))?;
    done(cli, "Bootloader unlocked");
    Ok(())
}

/// Shell command implementation.
pub(crate) fn cmd_shell(cli: &Cli, config: &Config) -> Result<()> {
    let mut sequencer = open_sequencer(cli, config, None)?;
    let mut reporter = ConsoleReporter::new(cli.quiet, use_fancy_output());

    check(sequencer.escalate_shell(console_baud(cli, config), &mut reporter))?;
    done(cli, "Full root shell enabled");
    Ok(())
}

/// Baud command implementation.
pub(crate) fn cmd_baud(cli: &Cli, config: &Config, new: u32) -> Result<()> {
    let current = console_baud(cli, config);
    if current == new {
        done(cli, &format!("Console already at {new} baud"));
        return Ok(());
    }

    let mut sequencer = open_sequencer(cli, config, None)?;
    let mut reporter = ConsoleReporter::new(cli.quiet, use_fancy_output());

    check(sequencer.change_baud(current, new, &mut reporter))?;
    done(
        cli,
        &format!("Console now at {new} baud, pass --baud {new} to later commands"),
    );
    Ok(())
}
