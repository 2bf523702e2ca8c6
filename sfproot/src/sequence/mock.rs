//! Scripted device for sequencer tests.
//!
//! A [`MockDevice`] plays a list of [`Step`]s back through every port it
//! opens. Device output can be gated on what the host has written, so a
//! test reads like a conversation with the bootloader.

use crate::error::{Error, Result};
use crate::port::{Port, Transport};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// One scripted device event.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Bytes the device prints.
    Emit(Vec<u8>),
    /// Stay silent until the host has written this text.
    AwaitWrite(String),
    /// Stay silent for a while.
    Silence(Duration),
    /// The stream ends.
    Eof,
}

impl Step {
    pub(crate) fn emit(text: &str) -> Self {
        Self::Emit(text.as_bytes().to_vec())
    }

    pub(crate) fn await_write(text: &str) -> Self {
        Self::AwaitWrite(text.to_string())
    }
}

#[derive(Default)]
struct State {
    script: VecDeque<Step>,
    written: Vec<u8>,
    scan_from: usize,
    silent_until: Option<Instant>,
    opens: Vec<u32>,
    open_attempts: usize,
    closes: usize,
    live_writers: usize,
    fail_write_on: Option<String>,
    fail_open_at: Option<usize>,
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

fn broken(what: &str) -> std::io::Error {
    std::io::Error::new(ErrorKind::BrokenPipe, what.to_string())
}

/// A fake serial device.
#[derive(Clone, Default)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<State>>,
}

impl MockDevice {
    pub(crate) fn new(script: Vec<Step>) -> Self {
        let _ = env_logger::builder()
            .is_test(true)
            .try_init();
        let device = Self::default();
        device
            .lock()
            .script = script.into();
        device
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Fail any write whose text contains `needle`.
    pub(crate) fn fail_write_containing(self, needle: &str) -> Self {
        self.lock()
            .fail_write_on = Some(needle.to_string());
        self
    }

    /// Fail the `index`-th open (0-based).
    pub(crate) fn fail_open_at(self, index: usize) -> Self {
        self.lock()
            .fail_open_at = Some(index);
        self
    }

    pub(crate) fn opens(&self) -> Vec<u32> {
        self.lock()
            .opens
            .clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.lock()
            .closes
    }

    pub(crate) fn live_writers(&self) -> usize {
        self.lock()
            .live_writers
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.lock()
            .written
            .clone()
    }

    pub(crate) fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }

    /// How many times `needle` was written.
    pub(crate) fn count(&self, needle: &str) -> usize {
        self.written_text()
            .matches(needle)
            .count()
    }

    pub(crate) fn script_done(&self) -> bool {
        self.lock()
            .script
            .is_empty()
    }
}

impl Transport for MockDevice {
    type Port = MockPort;

    fn open(&mut self, baud_rate: u32) -> Result<MockPort> {
        let mut state = self.lock();
        let attempt = state.open_attempts;
        state.open_attempts += 1;
        if state.fail_open_at == Some(attempt) {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::PermissionDenied,
                "port busy",
            )));
        }
        state
            .opens
            .push(baud_rate);
        drop(state);

        Ok(MockPort {
            device: self.clone(),
            open: true,
            baud_rate,
            timeout: Duration::from_millis(20),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Port handed out by [`MockDevice`].
pub(crate) struct MockPort {
    device: MockDevice,
    open: bool,
    baud_rate: u32,
    timeout: Duration,
}

impl MockPort {
    fn idle(&self) -> std::io::Result<usize> {
        std::thread::sleep(self.timeout.min(Duration::from_millis(5)));
        Err(std::io::Error::new(ErrorKind::TimedOut, "no data"))
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.open {
            return Err(std::io::Error::new(ErrorKind::NotConnected, "closed"));
        }

        let mut state = self.device.lock();
        loop {
            match state.script.front().cloned() {
                Some(Step::Emit(bytes)) => {
                    state.script.pop_front();
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        state
                            .script
                            .push_front(Step::Emit(bytes[n..].to_vec()));
                    }
                    return Ok(n);
                },
                Some(Step::AwaitWrite(needle)) => {
                    let from = state.scan_from;
                    if let Some(pos) = find_bytes(&state.written[from..], needle.as_bytes()) {
                        state.scan_from = from + pos + needle.len();
                        state.script.pop_front();
                        continue;
                    }
                    drop(state);
                    return self.idle();
                },
                Some(Step::Silence(duration)) => {
                    let until = *state
                        .silent_until
                        .get_or_insert_with(|| Instant::now() + duration);
                    if Instant::now() >= until {
                        state.silent_until = None;
                        state.script.pop_front();
                        continue;
                    }
                    drop(state);
                    return self.idle();
                },
                Some(Step::Eof) => return Ok(0),
                None => {
                    drop(state);
                    return self.idle();
                },
            }
        }
    }
}

fn record_write(device: &MockDevice, buf: &[u8]) -> std::io::Result<usize> {
    let mut state = device.lock();
    if let Some(needle) = &state.fail_write_on {
        if String::from_utf8_lossy(buf).contains(needle.as_str()) {
            return Err(broken("write failed"));
        }
    }
    state
        .written
        .extend_from_slice(buf);
    Ok(buf.len())
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.open {
            return Err(broken("closed"));
        }
        record_write(&self.device, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn try_clone_writer(&self) -> Result<Box<dyn Write + Send>> {
        if !self.open {
            return Err(Error::Io(broken("closed")));
        }
        self.device
            .lock()
            .live_writers += 1;
        Ok(Box::new(MockWriter {
            device: self
                .device
                .clone(),
        }))
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.device
                .lock()
                .closes += 1;
        }
        Ok(())
    }
}

/// Cloned write handle used by hammers.
struct MockWriter {
    device: MockDevice,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        record_write(&self.device, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for MockWriter {
    fn drop(&mut self) {
        self.device
            .lock()
            .live_writers -= 1;
    }
}

/// Run `f` on its own thread, failing the test if it has not returned
/// within `limit`.
pub(crate) fn within<R, F>(limit: Duration, f: F) -> R
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(limit)
        .unwrap_or_else(|_| panic!("still running after {limit:?}"))
}

/// Reporter that keeps everything it is told.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    pub(crate) messages: Vec<String>,
    pub(crate) errors: Vec<String>,
    pub(crate) progress: Vec<(usize, usize)>,
}

impl RecordingReporter {
    pub(crate) fn saw(&self, fragment: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.contains(fragment))
    }
}

impl super::Reporter for RecordingReporter {
    fn message(&mut self, text: &str) {
        self.messages
            .push(text.to_string());
    }

    fn error(&mut self, text: &str) {
        self.errors
            .push(text.to_string());
    }

    fn progress(&mut self, sent: usize, total: usize) {
        self.progress
            .push((sent, total));
    }
}
