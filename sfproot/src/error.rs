//! Error types for sfproot.

use std::io;
use thiserror::Error;

/// Result type for sfproot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sfproot operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the serial transport (open, read, write, close).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A wait exceeded its time budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The console stream ended while a marker was still awaited.
    #[error("Unexpected end of stream: {0}")]
    UnexpectedEof(String),

    /// YMODEM transfer error.
    #[error("YMODEM error: {0}")]
    Ymodem(String),

    /// Bootloader choreography error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The embedding application asked the running operation to stop.
    #[error("Operation interrupted")]
    Interrupted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error comes from the serial transport itself.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }
}
