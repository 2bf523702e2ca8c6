//! Port abstraction for the serial console.
//!
//! Two traits split the transport into what a sequencer needs:
//!
//! - [`Port`]: one open byte stream at one baud rate.
//! - [`Transport`]: something that can open a [`Port`] on the physical
//!   device at a requested baud rate.
//!
//! ```text
//! +-----------------------------------------+
//! |        Sequencer (unlock, flash...)     |
//! +-------------------+---------------------+
//!                     |
//!          +----------+-----------+
//!          |                      |
//!          v                      v
//! +--------+---------+   +--------+---------+
//! |  Console         |   |  RawLink         |
//! |  (line / chunk)  |   |  (YMODEM bytes)  |
//! +--------+---------+   +--------+---------+
//!          |                      |
//!          +----------+-----------+
//!                     v
//!           +---------+---------+
//!           |  Transport::open  |
//!           +---------+---------+
//!                     v
//!           +---------+---------+
//!           | NativePort        |
//!           |  (serialport)     |
//!           +-------------------+
//! ```
//!
//! Both session kinds borrow the transport mutably, so a line-mode session
//! and a raw session can never be open against the same port at once.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sfproot::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> sfproot::Result<()> {
//!     port.write_all_bytes(b"printenv\n")?;
//!
//!     let mut buf = [0u8; 64];
//!     let n = port.read(&mut buf)?;
//!     println!("Received: {:?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate the bootloader console starts at.
pub const DEFAULT_BAUD: u32 = 115200;

/// Serial port configuration.
///
/// Lines are always 8N1 without flow control, which is all the bootloader
/// console speaks.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(50),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Same settings at a different baud rate.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// An open byte stream to the device console.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    ///
    /// A read that sees no data within the timeout fails with
    /// [`std::io::ErrorKind::TimedOut`].
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Get the baud rate the port was opened at.
    fn baud_rate(&self) -> u32;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Create an independent write handle to the same port.
    ///
    /// Used by background writers that run while the owner keeps reading.
    fn try_clone_writer(&self) -> Result<Box<dyn Write + Send>>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    /// Closing an already closed port is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Opens ports on one physical serial device.
pub trait Transport {
    /// Concrete port type handed out by this transport.
    type Port: Port;

    /// Open the device at `baud_rate`.
    fn open(&mut self, baud_rate: u32) -> Result<Self::Port>;

    /// Name of the underlying device, for messages.
    fn name(&self) -> &str;
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator, NativeTransport};
