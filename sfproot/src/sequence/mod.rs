//! Bootloader automation sequences.
//!
//! A [`Sequencer`] owns the transport and runs one operation at a time:
//!
//! - [`Sequencer::unlock`]: halt autoboot and patch the environment until
//!   the bootloader console stays available.
//! - [`Sequencer::escalate_shell`]: boot into failsafe mode and replace the
//!   restricted login shell.
//! - [`Sequencer::change_baud`]: move the bootloader console to a new rate.
//! - [`Sequencer::send_image`] and [`Sequencer::wait_image_loaded`]: load
//!   an image into RAM over a block-transfer protocol.
//! - [`Sequencer::commit_bank`]: write the loaded image to a firmware bank
//!   and wait for the device to come back.
//!
//! Operations never return an error directly. Failures are reported through
//! the [`Reporter`] and carried in the returned [`SequenceResult`]; every
//! session and hammer is released before the call returns.

mod baud;
mod flash;
#[cfg(test)]
pub(crate) mod mock;
mod shell;
mod transfer;
mod unlock;

use crate::bootloader::BankLayout;
use crate::console::Console;
use crate::error::{Error, Result};
use crate::port::Transport;
use log::{error, info, warn};
use std::time::{Duration, Instant};

pub use transfer::DEFAULT_RAW_READ_TIMEOUT;

/// Default device name used in operator messages.
pub const DEFAULT_MODEL: &str = "SFP";

/// Every fixed delay the sequences use.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Timings {
    /// Period of every hammer.
    pub interrupt_period: Duration,
    /// Hammering continues this long after the bootloader banner.
    pub halt_grace: Duration,
    /// How long to look for the autoboot prompt after a halt.
    pub unlock_check: Duration,
    /// Pause after each console command.
    pub settle: Duration,
    /// How long the failsafe key is sent.
    pub failsafe_keys: Duration,
    /// Pause after the root prompt before the hammer stops.
    pub root_hold: Duration,
    /// Time the operator gets to unplug the device.
    pub replug_delay: Duration,
    /// Pause before watching the reboot after a flash commit.
    pub flash_guard: Duration,
    /// Give up unlocking after this many patch cycles. `None` retries forever.
    pub max_unlock_cycles: Option<u32>,
    /// Fail unbounded waits after this long. `None` waits forever.
    pub watchdog: Option<Duration>,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            interrupt_period: Duration::from_millis(10),
            halt_grace: Duration::from_secs(5),
            unlock_check: Duration::from_millis(2000),
            settle: Duration::from_secs(1),
            failsafe_keys: Duration::from_secs(3),
            root_hold: Duration::from_secs(1),
            replug_delay: Duration::from_secs(10),
            flash_guard: Duration::from_secs(1),
            max_unlock_cycles: None,
            watchdog: None,
        }
    }
}

impl Timings {
    /// Reject settings no sequence can run with.
    pub fn validate(&self) -> Result<()> {
        if self.interrupt_period.is_zero() {
            return Err(Error::Config("interrupt period must be non-zero".into()));
        }
        if self.max_unlock_cycles == Some(0) {
            return Err(Error::Config("unlock cycle cap must be at least 1".into()));
        }
        if self.watchdog.is_some_and(|w| w.is_zero()) {
            return Err(Error::Config("watchdog must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Timings {
    /// Millisecond-scale timings for scripted devices.
    pub(crate) fn fast() -> Self {
        Self {
            interrupt_period: Duration::from_millis(2),
            halt_grace: Duration::from_millis(15),
            unlock_check: Duration::from_millis(60),
            settle: Duration::from_millis(3),
            failsafe_keys: Duration::from_millis(15),
            root_hold: Duration::from_millis(3),
            replug_delay: Duration::from_millis(3),
            flash_guard: Duration::from_millis(3),
            max_unlock_cycles: None,
            watchdog: Some(Duration::from_secs(5)),
        }
    }
}

/// Receives operator-facing progress from a running sequence.
pub trait Reporter {
    /// A progress message.
    fn message(&mut self, text: &str);

    /// The error that ended the sequence.
    fn error(&mut self, text: &str);

    /// Image transfer progress.
    fn progress(&mut self, _sent: usize, _total: usize) {}
}

/// Reporter that forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn message(&mut self, text: &str) {
        info!("{text}");
    }

    fn error(&mut self, text: &str) {
        error!("{text}");
    }
}

/// Reporter built from a message callback and an error callback.
pub struct CallbackReporter<M, E> {
    on_message: M,
    on_error: E,
}

impl<M, E> CallbackReporter<M, E>
where
    M: FnMut(&str),
    E: FnMut(&str),
{
    /// Wrap the two callbacks.
    pub fn new(on_message: M, on_error: E) -> Self {
        Self {
            on_message,
            on_error,
        }
    }
}

impl<M, E> Reporter for CallbackReporter<M, E>
where
    M: FnMut(&str),
    E: FnMut(&str),
{
    fn message(&mut self, text: &str) {
        (self.on_message)(text);
    }

    fn error(&mut self, text: &str) {
        (self.on_error)(text);
    }
}

/// Outcome of one sequence.
#[must_use]
#[derive(Debug)]
pub struct SequenceResult {
    error: Option<Error>,
}

impl SequenceResult {
    fn success() -> Self {
        Self { error: None }
    }

    fn failure(error: Error) -> Self {
        Self { error: Some(error) }
    }

    /// Whether the sequence completed.
    pub fn is_success(&self) -> bool {
        self.error
            .is_none()
    }

    /// The error that ended the sequence, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error
            .as_ref()
    }

    /// Convert into a plain `Result`.
    pub fn into_result(self) -> Result<()> {
        match self.error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

/// Runs the bootloader sequences against one transport.
pub struct Sequencer<T: Transport> {
    transport: T,
    timings: Timings,
    layout: BankLayout,
    model: String,
}

impl<T: Transport> Sequencer<T> {
    /// Sequencer with default timings and bank layout.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timings: Timings::default(),
            layout: BankLayout::default(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Replace the timings.
    #[must_use]
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Replace the bank layout.
    #[must_use]
    pub fn with_layout(mut self, layout: BankLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Device name used in operator messages.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Current timings.
    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Current bank layout.
    pub fn layout(&self) -> &BankLayout {
        &self.layout
    }

    /// Device name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give the transport back.
    pub fn into_transport(self) -> T {
        self.transport
    }
}

/// Open a console with the watchdog from `timings`.
fn open_console<'t, T: Transport>(
    transport: &'t mut T,
    timings: &Timings,
    baud_rate: u32,
) -> Result<Console<'t, T::Port>> {
    timings.validate()?;
    Ok(Console::open(transport, baud_rate)?.with_watchdog(timings.watchdog))
}

/// Sleep for `duration`, giving up early on an interrupt request.
fn pause(duration: Duration) -> Result<()> {
    const SLICE: Duration = Duration::from_millis(50);

    let deadline = Instant::now() + duration;
    loop {
        if crate::is_interrupted_requested() {
            return Err(Error::Interrupted);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep((deadline - now).min(SLICE));
    }
}

/// Close out a sequence: report a failure, or log success.
fn finish(name: &str, reporter: &mut dyn Reporter, outcome: Result<()>) -> SequenceResult {
    match outcome {
        Ok(()) => {
            info!("{name} finished");
            SequenceResult::success()
        },
        Err(e) => {
            warn!("{name} failed: {e}");
            reporter.error(&format!("Error: {e}"));
            SequenceResult::failure(e)
        },
    }
}
