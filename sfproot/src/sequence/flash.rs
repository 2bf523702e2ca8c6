//! Flash commit of the image in RAM to one firmware bank.

use super::{Reporter, SequenceResult, Sequencer, finish, open_console, pause};
use crate::bootloader::{FirmwareBank, markers};
use crate::error::Result;
use crate::matcher::MatchRule;
use crate::port::Transport;
use log::info;

impl<T: Transport> Sequencer<T> {
    /// Write the image loaded at the RAM load address to `bank`, make it the
    /// committed bank, and wait for the bootloader to come back after the
    /// reset.
    pub fn commit_bank(
        &mut self,
        baud_rate: u32,
        bank: FirmwareBank,
        reporter: &mut dyn Reporter,
    ) -> SequenceResult {
        let outcome = self.run_commit_bank(baud_rate, bank, reporter);
        finish("Flash commit", reporter, outcome)
    }

    fn run_commit_bank(
        &mut self,
        baud_rate: u32,
        bank: FirmwareBank,
        reporter: &mut dyn Reporter,
    ) -> Result<()> {
        let timings = &self.timings;
        let command = self
            .layout
            .commit_command(bank);
        info!("Committing {bank} at {}", self.layout.region(bank).sf_args());
        reporter.message(&format!(
            "Flashing {bank}, DO NOT TOUCH THE {} UNTIL THE PROCEDURE IS COMPLETED!",
            self.model
        ));

        let mut console = open_console(&mut self.transport, timings, baud_rate)?;
        console.write_str(&command)?;
        console.close()?;

        let mut console = open_console(&mut self.transport, timings, baud_rate)?;
        pause(timings.flash_guard)?;
        reporter.message("Waiting for reboot");
        console.wait_for(&MatchRule::line_starts_with(markers::UBOOT_BANNER))?;
        console.close()?;

        reporter.message(&format!("{bank} committed, device rebooted"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Timings;
    use super::super::mock::{MockDevice, RecordingReporter, Step};
    use super::*;
    use crate::bootloader::{BankLayout, BankRegion};
    use crate::error::Error;
    use std::time::Duration;

    fn reboot_after(command: &str) -> Vec<Step> {
        vec![
            Step::await_write(command),
            Step::emit("SF: Detected MX25L12805D\r\nErasing: 100%\r\nWriting: 100%\r\n"),
            Step::emit("Saving Environment to SPI Flash...\r\nresetting ...\r\n"),
            Step::Silence(Duration::from_millis(10)),
            Step::emit("\r\nROM VER: 1.1.4\r\nU-Boot 2010.06-LANTIQ\r\n"),
        ]
    }

    #[test]
    fn test_bank0_exact_command() {
        let expected = "sf probe 0 && sf erase C0000 740000 && sf write 80800000 C0000 740000 && setenv committed_image 0 && setenv image0_is_valid 1 && saveenv && reset\n";
        let mut sequencer =
            Sequencer::new(MockDevice::new(reboot_after(expected))).with_timings(Timings::fast());
        let mut reporter = RecordingReporter::default();

        assert!(
            sequencer
                .commit_bank(115200, FirmwareBank::Bank0, &mut reporter)
                .is_success()
        );
        let device = sequencer.transport();
        assert_eq!(device.written_text(), expected);
        assert_eq!(device.opens(), vec![115200, 115200]);
        assert_eq!(device.closes(), 2);
        assert!(device.script_done());
    }

    #[test]
    fn test_bank1_exact_command() {
        let expected = "sf probe 0 && sf erase 800000 800000 && sf write 80800000 800000 800000 && setenv committed_image 1 && setenv image1_is_valid 1 && saveenv && reset\n";
        let mut sequencer =
            Sequencer::new(MockDevice::new(reboot_after(expected))).with_timings(Timings::fast());
        let mut reporter = RecordingReporter::default();

        assert!(
            sequencer
                .commit_bank(115200, FirmwareBank::Bank1, &mut reporter)
                .is_success()
        );
        assert_eq!(sequencer.transport().written_text(), expected);
    }

    #[test]
    fn test_custom_layout_is_used() {
        let layout = BankLayout {
            bank1: BankRegion {
                offset: 0x90_0000,
                length: 0x70_0000,
            },
            ..BankLayout::default()
        };
        let command = layout.commit_command(FirmwareBank::Bank1);
        let mut sequencer = Sequencer::new(MockDevice::new(reboot_after(&command)))
            .with_timings(Timings::fast())
            .with_layout(layout);
        let mut reporter = RecordingReporter::default();

        assert!(
            sequencer
                .commit_bank(115200, FirmwareBank::Bank1, &mut reporter)
                .is_success()
        );
        assert!(
            sequencer
                .transport()
                .written_text()
                .contains("sf erase 900000 700000")
        );
    }

    #[test]
    fn test_write_failure_releases_session() {
        let device = MockDevice::new(vec![]).fail_write_containing("sf probe");
        let mut sequencer = Sequencer::new(device).with_timings(Timings::fast());
        let mut reporter = RecordingReporter::default();

        let result = sequencer.commit_bank(115200, FirmwareBank::Bank0, &mut reporter);
        assert!(
            result
                .error()
                .is_some_and(Error::is_transport)
        );
        let device = sequencer.transport();
        assert_eq!(device.opens().len(), 1);
        assert_eq!(device.closes(), 1);
        assert_eq!(reporter.errors.len(), 1);
    }

    #[test]
    fn test_reboot_watch_reopen_failure() {
        let device = MockDevice::new(vec![]).fail_open_at(1);
        let mut sequencer = Sequencer::new(device).with_timings(Timings::fast());
        let mut reporter = RecordingReporter::default();

        assert!(
            !sequencer
                .commit_bank(115200, FirmwareBank::Bank0, &mut reporter)
                .is_success()
        );
        assert_eq!(sequencer.transport().closes(), 1);
    }

    #[test]
    fn test_device_that_never_returns_hits_watchdog() {
        let timings = Timings {
            watchdog: Some(Duration::from_millis(60)),
            ..Timings::fast()
        };
        let mut sequencer = Sequencer::new(MockDevice::new(vec![])).with_timings(timings);
        let mut reporter = RecordingReporter::default();

        let result = sequencer.commit_bank(115200, FirmwareBank::Bank0, &mut reporter);
        assert!(matches!(result.error(), Some(Error::Timeout(_))));
        assert_eq!(sequencer.transport().closes(), 2);
    }
}
