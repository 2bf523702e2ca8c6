//! Bootloader baud rate negotiation.

use super::{Reporter, SequenceResult, Sequencer, finish, open_console, pause};
use crate::bootloader::{markers, set_baudrate};
use crate::error::Result;
use crate::matcher::MatchRule;
use crate::port::Transport;
use log::info;

impl<T: Transport> Sequencer<T> {
    /// Switch the bootloader console from `current` to `new` baud.
    ///
    /// Succeeds once the bootloader prompt answers at the new rate.
    pub fn change_baud(
        &mut self,
        current: u32,
        new: u32,
        reporter: &mut dyn Reporter,
    ) -> SequenceResult {
        let outcome = self.run_change_baud(current, new, reporter);
        finish("Baud change", reporter, outcome)
    }

    fn run_change_baud(&mut self, current: u32, new: u32, reporter: &mut dyn Reporter) -> Result<()> {
        let timings = &self.timings;
        reporter.message(&format!("Changing baud rate from {current} to {new}..."));

        let mut console = open_console(&mut self.transport, timings, current)?;
        console.write_str(&set_baudrate(new))?;
        pause(timings.settle)?;
        console.close()?;

        let mut console = open_console(&mut self.transport, timings, new)?;
        console.start_hammer(b"\r".to_vec(), timings.interrupt_period)?;
        console.wait_for(&MatchRule::contains(markers::BAUD_BANNER))?;
        console.stop_hammer()?;
        console.close()?;

        info!("Console now at {new} baud");
        reporter.message(&format!("Baud rate changed to {new}"));
        Ok(())
    }
}
