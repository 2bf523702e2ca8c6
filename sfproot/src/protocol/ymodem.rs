//! YMODEM-1K sender, as expected by U-Boot's `loady`.
//!
//! ```text
//! Block format:
//! +-----+-----+------+---------------+--------+
//! | STX | SEQ | ~SEQ |   DATA (1024) | CRC16  |
//! +-----+-----+------+---------------+--------+
//! | 1   | 1   | 1    |     1024      | 2      |
//! +-----+-----+------+---------------+--------+
//! ```
//!
//! Block 0 is a 128-byte SOH block carrying `name\0size\0`. The session ends
//! with EOT and an all-zero block 0.

use crate::error::{Error, Result};
use crate::protocol::ImageTransferProtocol;
use crate::protocol::crc::crc16_xmodem;
use log::{debug, trace, warn};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// YMODEM control characters.
pub mod control {
    /// Start of Header (128-byte block).
    pub const SOH: u8 = 0x01;
    /// Start of Text (1024-byte block).
    pub const STX: u8 = 0x02;
    /// End of Transmission.
    pub const EOT: u8 = 0x04;
    /// Acknowledge.
    pub const ACK: u8 = 0x06;
    /// Not Acknowledge.
    pub const NAK: u8 = 0x15;
    /// Cancel.
    pub const CAN: u8 = 0x18;
    /// CRC mode request character.
    pub const C: u8 = b'C';
}

/// Block size for SOH packets.
pub const SOH_BLOCK_SIZE: usize = 128;

/// Block size for STX packets (YMODEM-1K).
pub const STX_BLOCK_SIZE: usize = 1024;

/// YMODEM configuration options.
#[derive(Debug, Clone)]
pub struct YmodemConfig {
    /// Timeout for waiting for a response character.
    pub char_timeout: Duration,
    /// Timeout for waiting for a 'C'.
    pub c_timeout: Duration,
    /// Maximum attempts for sending a block.
    pub max_retries: u32,
    /// The receiver sends another 'C' after block 0 and before the finish
    /// block. U-Boot does.
    pub second_c: bool,
}

impl Default for YmodemConfig {
    fn default() -> Self {
        Self {
            char_timeout: Duration::from_millis(1000),
            c_timeout: Duration::from_secs(60),
            max_retries: 10,
            second_c: true,
        }
    }
}

/// YMODEM transfer over one link.
pub struct YmodemTransfer<'a, P: Read + Write> {
    port: &'a mut P,
    config: YmodemConfig,
}

impl<'a, P: Read + Write> YmodemTransfer<'a, P> {
    /// Create a transfer with default configuration.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            config: YmodemConfig::default(),
        }
    }

    /// Create a transfer with custom configuration.
    pub fn with_config(port: &'a mut P, config: YmodemConfig) -> Self {
        Self { port, config }
    }

    /// Read one byte, bounded by `timeout`.
    ///
    /// The link's own read timeout sets the polling granularity.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        let started = Instant::now();
        let mut buf = [0u8; 1];
        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }
            match self
                .port
                .read(&mut buf)
            {
                Ok(1) => return Ok(buf[0]),
                Ok(_) => {},
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) => {},
                Err(e) => return Err(Error::Io(e)),
            }
            if started.elapsed() >= timeout {
                return Err(Error::Timeout("read_byte: timeout".into()));
            }
        }
    }

    /// Wait for the receiver to send 'C' (CRC mode request).
    pub fn wait_for_c(&mut self) -> Result<()> {
        debug!("Waiting for 'C' from receiver...");
        let start = Instant::now();

        while start.elapsed() < self.config.c_timeout {
            match self.read_byte(self.config.char_timeout) {
                Ok(control::C) => {
                    debug!("Received 'C'");
                    return Ok(());
                },
                Ok(control::CAN) => {
                    return Err(Error::Ymodem("Transfer cancelled by receiver".into()));
                },
                Ok(c) => {
                    trace!("Received unexpected char: 0x{c:02X}");
                },
                Err(Error::Timeout(_)) => {},
                Err(e) => return Err(e),
            }
        }

        Err(Error::Timeout("Timeout waiting for 'C'".into()))
    }

    /// Build a YMODEM block.
    fn build_block(seq: u8, data: &[u8], use_stx: bool) -> Vec<u8> {
        let block_size = if use_stx {
            STX_BLOCK_SIZE
        } else {
            SOH_BLOCK_SIZE
        };
        let header = if use_stx { control::STX } else { control::SOH };

        let mut block = Vec::with_capacity(3 + block_size + 2);
        block.push(header);
        block.push(seq);
        block.push(!seq);

        if data.len() >= block_size {
            block.extend_from_slice(&data[..block_size]);
        } else {
            block.extend_from_slice(data);
            block.resize(3 + block_size, 0x00);
        }

        let crc = crc16_xmodem(&block[3..3 + block_size]);
        block.extend_from_slice(&crc.to_be_bytes());

        block
    }

    /// Send a block and wait for ACK.
    fn send_block(&mut self, block: &[u8]) -> Result<()> {
        for retry in 0..self.config.max_retries {
            trace!("Sending block {} (attempt {})", block[1], retry + 1);

            self.port
                .write_all(block)?;
            self.port
                .flush()?;

            match self.read_byte(self.config.char_timeout) {
                Ok(control::ACK) => {
                    trace!("Block ACKed");
                    return Ok(());
                },
                Ok(control::NAK) => {
                    debug!("Block NAKed, retrying...");
                },
                Ok(control::CAN) => {
                    return Err(Error::Ymodem("Transfer cancelled by receiver".into()));
                },
                Ok(c) => {
                    debug!("Unexpected response: 0x{c:02X}, retrying...");
                },
                Err(Error::Timeout(_)) => {
                    debug!("Timeout waiting for ACK, retrying...");
                },
                Err(e) => return Err(e),
            }
        }

        Err(Error::Ymodem(format!(
            "Block transfer failed after {} retries",
            self.config.max_retries
        )))
    }

    /// Send the file information block (block 0): `filename\0filesize\0`.
    pub fn send_file_info(&mut self, filename: &str, filesize: usize) -> Result<()> {
        debug!("Sending file info: {filename} ({filesize} bytes)");

        let mut data = Vec::with_capacity(SOH_BLOCK_SIZE);
        data.extend_from_slice(filename.as_bytes());
        data.push(0x00);
        data.extend_from_slice(
            filesize
                .to_string()
                .as_bytes(),
        );
        data.push(0x00);
        if data.len() > SOH_BLOCK_SIZE {
            return Err(Error::Ymodem(format!("file name too long: {filename}")));
        }

        let block = Self::build_block(0, &data, false);
        self.send_block(&block)
    }

    /// Send EOT until the receiver acknowledges it.
    ///
    /// Returns `true` when the receiver already answered with the 'C' that
    /// precedes the finish block.
    pub fn send_eot(&mut self) -> Result<bool> {
        debug!("Sending EOT");

        for _retry in 0..self.config.max_retries {
            self.port
                .write_all(&[control::EOT])?;
            self.port
                .flush()?;

            match self.read_byte(self.config.char_timeout) {
                Ok(control::ACK) => {
                    debug!("EOT ACKed");
                    return Ok(false);
                },
                Ok(control::C) => return Ok(true),
                Ok(control::CAN) => {
                    return Err(Error::Ymodem("Transfer cancelled by receiver".into()));
                },
                // NAK, timeout, or unexpected response - retry
                Ok(_) | Err(Error::Timeout(_)) => {},
                Err(e) => return Err(e),
            }
        }

        Err(Error::Ymodem("EOT not acknowledged".into()))
    }

    /// Send the finish block (empty block 0) that ends the session.
    pub fn send_finish(&mut self) -> Result<()> {
        debug!("Sending finish block");
        let block = Self::build_block(0, &[], false);
        self.send_block(&block)
    }

    /// Ask the receiver to abort.
    pub fn cancel(&mut self) {
        let _ = self
            .port
            .write_all(&[control::CAN, control::CAN])
            .and_then(|()| {
                self.port
                    .flush()
            });
    }

    /// Transfer file data.
    ///
    /// # Arguments
    ///
    /// * `filename` - Name sent in block 0
    /// * `data` - File data to transfer
    /// * `progress` - Progress callback (current, total)
    pub fn transfer<F>(&mut self, filename: &str, data: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        debug!(
            "Starting YMODEM transfer: {} ({} bytes)",
            filename,
            data.len()
        );

        self.wait_for_c()?;
        self.send_file_info(filename, data.len())?;
        if self
            .config
            .second_c
        {
            self.wait_for_c()?;
        }

        let mut seq: u8 = 1;
        let mut offset = 0;
        let total = data.len();
        progress(0, total);

        while offset < total {
            let chunk_end = (offset + STX_BLOCK_SIZE).min(total);
            let block = Self::build_block(seq, &data[offset..chunk_end], true);
            self.send_block(&block)?;

            offset = chunk_end;
            seq = seq.wrapping_add(1);
            progress(offset, total);
        }

        let c_seen = self.send_eot()?;
        if self
            .config
            .second_c
            && !c_seen
        {
            self.wait_for_c()?;
        }

        // The image is already in RAM; a lost finish ACK only delays the prompt
        if let Err(e) = self.send_finish() {
            warn!("Finish block not acknowledged: {e}");
        }

        debug!("YMODEM transfer complete");
        Ok(())
    }
}

/// [`ImageTransferProtocol`] implementation backed by [`YmodemTransfer`].
#[derive(Debug, Clone, Default)]
pub struct Ymodem {
    config: YmodemConfig,
}

impl Ymodem {
    /// Sender with the given configuration.
    pub fn new(config: YmodemConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &YmodemConfig {
        &self.config
    }
}

impl ImageTransferProtocol for Ymodem {
    fn name(&self) -> &'static str {
        "YMODEM-1K"
    }

    fn send<L: Read + Write>(
        &self,
        link: &mut L,
        file_name: &str,
        data: &[u8],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        let mut transfer = YmodemTransfer::with_config(link, self.config.clone());
        let result = transfer.transfer(file_name, data, progress);
        if result.is_err() {
            transfer.cancel();
        }
        result
    }
}
