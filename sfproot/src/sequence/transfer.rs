//! Image upload into RAM via `loady`.

use super::{Reporter, SequenceResult, Sequencer, finish, open_console, pause};
use crate::bootloader::{loady, markers};
use crate::console::RawLink;
use crate::error::Result;
use crate::matcher::MatchRule;
use crate::port::Transport;
use crate::protocol::ImageTransferProtocol;
use log::info;
use std::time::Duration;

/// Read timeout of the raw link during a transfer.
pub const DEFAULT_RAW_READ_TIMEOUT: Duration = Duration::from_millis(100);

impl<T: Transport> Sequencer<T> {
    /// Load `image` into RAM at the layout's load address.
    ///
    /// The console is closed after `loady` and the transfer runs on a
    /// freshly opened raw link, which is closed whatever the outcome.
    pub fn send_image<P: ImageTransferProtocol>(
        &mut self,
        baud_rate: u32,
        protocol: &P,
        file_name: &str,
        image: &[u8],
        reporter: &mut dyn Reporter,
    ) -> SequenceResult {
        let outcome = self.run_send_image(baud_rate, protocol, file_name, image, reporter);
        finish("Image transfer", reporter, outcome)
    }

    fn run_send_image<P: ImageTransferProtocol>(
        &mut self,
        baud_rate: u32,
        protocol: &P,
        file_name: &str,
        image: &[u8],
        reporter: &mut dyn Reporter,
    ) -> Result<()> {
        let timings = &self.timings;
        reporter.message(&format!(
            "Sending {file_name} ({} bytes) to 0x{:X}...",
            image.len(),
            self.layout.ram_load_addr
        ));

        let mut console = open_console(&mut self.transport, timings, baud_rate)?;
        console.write_str(&loady(self.layout.ram_load_addr))?;
        pause(timings.settle)?;
        console.close()?;

        let mut link = RawLink::open(&mut self.transport, baud_rate, DEFAULT_RAW_READ_TIMEOUT)?;
        info!("{} transfer of {} bytes", protocol.name(), image.len());
        let sent = protocol.send(&mut link, file_name, image, &mut |done: usize, total: usize| {
            reporter.progress(done, total);
        });
        let closed = link.close();
        sent?;
        closed?;

        reporter.message("Image sent");
        Ok(())
    }

    /// Wait for the bootloader to confirm the image landed in RAM.
    pub fn wait_image_loaded(&mut self, baud_rate: u32, reporter: &mut dyn Reporter) -> SequenceResult {
        let outcome = self.run_wait_image_loaded(baud_rate, reporter);
        finish("Image load confirmation", reporter, outcome)
    }

    fn run_wait_image_loaded(&mut self, baud_rate: u32, reporter: &mut dyn Reporter) -> Result<()> {
        let timings = &self.timings;
        let mut console = open_console(&mut self.transport, timings, baud_rate)?;
        console.wait_for(&MatchRule::contains(markers::TOTAL_SIZE))?;
        pause(timings.settle)?;
        console.close()?;

        reporter.message("Image loaded into RAM");
        Ok(())
    }
}
