//! Block-transfer protocols used to push an image over a raw link.

pub mod crc;
pub mod ymodem;

use crate::error::Result;
use std::io::{Read, Write};

pub use ymodem::{Ymodem, YmodemConfig};

/// Sends an image over an already-open raw link.
///
/// Implementations own the framing (blocks, checksums, retransmission). The
/// caller owns the link and closes it afterwards whatever the outcome.
pub trait ImageTransferProtocol {
    /// Short protocol name for logs.
    fn name(&self) -> &'static str;

    /// Transfer `data` as `file_name`.
    ///
    /// `progress` is called with `(bytes_sent, total_bytes)` as blocks are
    /// acknowledged.
    fn send<L: Read + Write>(
        &self,
        link: &mut L,
        file_name: &str,
        data: &[u8],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()>;
}
