//! # sfproot
//!
//! Serial bootloader automation for Lantiq Falcon based GPON SFP sticks.
//!
//! The crate drives the device's U-Boot console over a serial port:
//!
//! - halting autoboot and unlocking the bootloader console
//! - escalating the failsafe shell to a full root shell
//! - negotiating a faster console baud rate
//! - loading an image into RAM over YMODEM (`loady`)
//! - committing it to one of the two firmware banks
//!
//! ## Features
//!
//! - `native` (default): serial ports via the `serialport` crate
//! - `serde`: serialization support for timings and the bank layout
//!
//! ## Example
//!
//! ```rust,no_run
//! use sfproot::{FirmwareBank, LogReporter, NativeTransport, Sequencer, Ymodem};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = std::fs::read("image.bin")?;
//!     let mut sequencer = Sequencer::new(NativeTransport::new("/dev/ttyUSB0"));
//!     let mut reporter = LogReporter;
//!
//!     sequencer
//!         .send_image(115200, &Ymodem::default(), "image.bin", &image, &mut reporter)
//!         .into_result()?;
//!     sequencer
//!         .wait_image_loaded(115200, &mut reporter)
//!         .into_result()?;
//!     sequencer
//!         .commit_bank(115200, FirmwareBank::Bank1, &mut reporter)
//!         .into_result()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod bootloader;
pub mod console;
pub mod error;
pub mod hammer;
pub mod matcher;
pub mod monitor;
pub mod port;
pub mod protocol;
pub mod sequence;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Per test thread, so parallel tests do not interrupt each other
#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::cell::Cell;

    thread_local! {
        static TEST_INTERRUPT_FLAG: Cell<bool> = const { Cell::new(false) };
    }

    set_interrupt_checker(|| TEST_INTERRUPT_FLAG.with(Cell::get));
    TEST_INTERRUPT_FLAG.with(|flag| flag.set(value));
}

#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator, NativeTransport};
pub use {
    bootloader::{BankLayout, BankRegion, FirmwareBank},
    console::{Console, RawLink},
    error::{Error, Result},
    hammer::Hammer,
    matcher::{MatchBuffer, MatchKind, MatchRule},
    port::{Port, PortEnumerator, PortInfo, SerialConfig, Transport},
    protocol::{ImageTransferProtocol, Ymodem, YmodemConfig},
    sequence::{CallbackReporter, LogReporter, Reporter, SequenceResult, Sequencer, Timings},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        test_set_interrupted(true);
        assert!(is_interrupted_requested());

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }

    #[test]
    fn test_interrupt_is_per_thread_in_tests() {
        test_set_interrupted(true);
        let other = std::thread::spawn(is_interrupted_requested)
            .join()
            .unwrap();
        test_set_interrupted(false);
        assert!(!other);
    }
}
