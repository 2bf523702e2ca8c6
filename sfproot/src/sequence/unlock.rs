//! Bootloader unlock.
//!
//! A locked bootloader autoboots without offering its console. Each cycle
//! halts autoboot with Ctrl-C, looks for the autoboot prompt that only an
//! unlocked bootloader prints, and if it is missing patches the environment
//! and reboots. Cycles repeat until the prompt shows up, a transport error
//! occurs, or the optional cycle cap is reached.

use super::{Reporter, SequenceResult, Sequencer, finish, open_console, pause};
use crate::bootloader::{INTERRUPT_CHAR, RESET, markers, unlock_patch};
use crate::error::{Error, Result};
use crate::matcher::MatchRule;
use crate::port::Transport;
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnlockState {
    AwaitingHalt,
    CheckingUnlock,
    Patching,
    Unlocked,
}

impl<T: Transport> Sequencer<T> {
    /// Unlock the bootloader console.
    ///
    /// The operator is asked to re-plug the device first; the sequence then
    /// waits for it to boot. Without `max_unlock_cycles` this retries
    /// indefinitely.
    pub fn unlock(&mut self, baud_rate: u32, reporter: &mut dyn Reporter) -> SequenceResult {
        let outcome = self.run_unlock(baud_rate, reporter);
        finish("Unlock", reporter, outcome)
    }

    fn run_unlock(&mut self, baud_rate: u32, reporter: &mut dyn Reporter) -> Result<()> {
        let timings = &self.timings;
        let model = &self.model;
        timings.validate()?;

        reporter.message(&format!(
            "Please disconnect the {model} from the SFP adapter if it is currently plugged in!"
        ));
        pause(timings.replug_delay)?;
        reporter.message(&format!(
            "Now you need to insert the {model} into the SFP adapter, if the procedure does not go ahead, check the connections and then remove and reconnect the {model} again"
        ));

        let mut console = open_console(&mut self.transport, timings, baud_rate)?;
        let mut state = UnlockState::AwaitingHalt;
        let mut cycles = 0u32;

        while state != UnlockState::Unlocked {
            debug!("Unlock state: {state:?}");
            state = match state {
                UnlockState::AwaitingHalt => {
                    console.start_hammer(vec![INTERRUPT_CHAR], timings.interrupt_period)?;
                    console.wait_for(&MatchRule::line_starts_with(markers::UBOOT_BANNER))?;
                    reporter.message(&format!(
                        "Root in progress: Trigger characters received. DO NOT TOUCH THE {model} UNTIL THE PROCEDURE IS COMPLETED!"
                    ));
                    pause(timings.halt_grace)?;
                    console.stop_hammer()?;
                    UnlockState::CheckingUnlock
                },
                UnlockState::CheckingUnlock => {
                    let prompt = MatchRule::line_starts_with(markers::AUTOBOOT_PROMPT)
                        .with_timeout(timings.unlock_check);
                    if console.wait_for(&prompt)? {
                        UnlockState::Unlocked
                    } else {
                        UnlockState::Patching
                    }
                },
                UnlockState::Patching => {
                    if let Some(max) = timings.max_unlock_cycles {
                        if cycles >= max {
                            return Err(Error::Protocol(format!(
                                "bootloader still locked after {max} patch cycles"
                            )));
                        }
                    }
                    cycles += 1;
                    info!("Bootloader locked, patch cycle {cycles}");

                    for (message, command) in unlock_patch() {
                        reporter.message(&format!("Root in progress: {message}"));
                        console.write_str(&command)?;
                        pause(timings.settle)?;
                    }
                    reporter.message("Root in progress: Rebooting...");
                    console.write_str(RESET)?;
                    pause(timings.settle)?;
                    UnlockState::AwaitingHalt
                },
                UnlockState::Unlocked => UnlockState::Unlocked,
            };
        }

        info!("Bootloader unlocked after {cycles} patch cycles");
        console.close()
    }
}
