//! Failsafe shell escalation.
//!
//! Reboots the device, keys it into failsafe mode, and rewrites the overlay
//! passwd so the restricted login shell becomes a full one. The console
//! here is the booting firmware rather than the bootloader, so every wait
//! is a chunk-mode search.

use super::{Reporter, SequenceResult, Sequencer, finish, open_console, pause};
use crate::bootloader::{ENABLE_FULL_SHELL, FAILSAFE_KEY, RESET, UNMOUNT_OVERLAY, markers};
use crate::error::Result;
use crate::matcher::MatchRule;
use crate::port::Transport;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShellState {
    Rebooting,
    AwaitingFailsafe,
    SelectingFailsafe,
    AwaitingRootPrompt,
    PatchingPasswd,
    Done,
}

impl<T: Transport> Sequencer<T> {
    /// Boot into failsafe mode and enable a full login shell.
    pub fn escalate_shell(&mut self, baud_rate: u32, reporter: &mut dyn Reporter) -> SequenceResult {
        let outcome = self.run_escalate_shell(baud_rate, reporter);
        finish("Shell escalation", reporter, outcome)
    }

    fn run_escalate_shell(&mut self, baud_rate: u32, reporter: &mut dyn Reporter) -> Result<()> {
        let timings = &self.timings;
        let mut console = open_console(&mut self.transport, timings, baud_rate)?;
        let mut state = ShellState::Rebooting;

        while state != ShellState::Done {
            debug!("Shell state: {state:?}");
            state = match state {
                ShellState::Rebooting => {
                    reporter.message("Root in progress: Rebooting...");
                    console.write_str(RESET)?;
                    pause(timings.settle)?;
                    ShellState::AwaitingFailsafe
                },
                ShellState::AwaitingFailsafe => {
                    reporter.message("Waiting for reboot");
                    console.wait_for(&MatchRule::contains(markers::FAILSAFE_PROMPT))?;
                    ShellState::SelectingFailsafe
                },
                ShellState::SelectingFailsafe => {
                    console.start_hammer(FAILSAFE_KEY, timings.interrupt_period)?;
                    reporter.message(
                        "Root in progress: Trigger characters received. Waiting for boot to end...",
                    );
                    pause(timings.failsafe_keys)?;
                    console.stop_hammer()?;
                    ShellState::AwaitingRootPrompt
                },
                ShellState::AwaitingRootPrompt => {
                    console.start_hammer(b"\n".to_vec(), timings.interrupt_period)?;
                    console.wait_for(&MatchRule::contains(markers::ROOT_PROMPT))?;
                    pause(timings.root_hold)?;
                    console.stop_hammer()?;
                    ShellState::PatchingPasswd
                },
                ShellState::PatchingPasswd => {
                    reporter.message("Root in progress: Enable full Linux shell...");
                    console.write_str(ENABLE_FULL_SHELL)?;
                    pause(timings.settle)?;

                    reporter.message("Root in progress: Umount rootfs partitions...");
                    console.write_str(UNMOUNT_OVERLAY)?;
                    pause(timings.settle)?;
                    ShellState::Done
                },
                ShellState::Done => ShellState::Done,
            };
        }

        console.close()
    }
}
