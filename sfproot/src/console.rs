//! Console sessions over a [`Transport`].
//!
//! A [`Console`] is one open port in text mode: commands go out as strings,
//! device output is matched line by line or chunk by chunk with
//! [`MatchRule`]s, and at most one [`Hammer`] may run beside the reader.
//!
//! A [`RawLink`] is one open port in raw mode, handed to a block-transfer
//! protocol as a plain `Read + Write`.
//!
//! Both borrow the transport mutably for their whole life, so only one
//! session can be open against a device at a time, and both close the port
//! (and stop any hammer) when dropped.

use crate::error::{Error, Result};
use crate::hammer::Hammer;
use crate::matcher::{MatchBuffer, MatchRule};
use crate::monitor::{TextDecoder, clean_console_text};
use crate::port::{Port, Transport};
use log::{debug, trace};
use std::io::{ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::time::{Duration, Instant};

/// Read timeout used while polling for console output.
///
/// Bounded waits overshoot their deadline by at most this much.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A text-mode session on the device console.
pub struct Console<'t, P: Port> {
    port: Option<P>,
    buffer: MatchBuffer,
    decoder: TextDecoder,
    hammer: Option<Hammer>,
    watchdog: Option<Duration>,
    _transport: PhantomData<&'t mut ()>,
}

impl<'t, P: Port> Console<'t, P> {
    /// Open a console on `transport` at `baud_rate`.
    pub fn open<T>(transport: &'t mut T, baud_rate: u32) -> Result<Self>
    where
        T: Transport<Port = P>,
    {
        let mut port = transport.open(baud_rate)?;
        port.set_timeout(POLL_INTERVAL)?;
        debug!("Console open on {} at {baud_rate} baud", port.name());

        Ok(Self {
            port: Some(port),
            buffer: MatchBuffer::new(),
            decoder: TextDecoder::new(),
            hammer: None,
            watchdog: None,
            _transport: PhantomData,
        })
    }

    /// Fail unbounded waits with [`Error::Timeout`] after `watchdog`.
    #[must_use]
    pub fn with_watchdog(mut self, watchdog: Option<Duration>) -> Self {
        self.watchdog = watchdog;
        self
    }

    fn port_mut(&mut self) -> Result<&mut P> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::Io(std::io::Error::new(ErrorKind::NotConnected, "console closed")))
    }

    /// Baud rate of the open port.
    pub fn baud_rate(&self) -> Option<u32> {
        self.port
            .as_ref()
            .map(Port::baud_rate)
    }

    /// Send a command string exactly as given.
    pub fn write_str(&mut self, command: &str) -> Result<()> {
        debug!("> {}", command.trim_end());
        self.port_mut()?
            .write_all_bytes(command.as_bytes())
    }

    /// Wait until the console satisfies `rule`.
    ///
    /// Returns `Ok(false)` only when the rule's own timeout elapses. Without
    /// a timeout the call blocks until a match, a transport error, the
    /// console watchdog, or an interrupt request.
    pub fn wait_for(&mut self, rule: &MatchRule) -> Result<bool> {
        Ok(self
            .wait_for_text(rule)?
            .is_some())
    }

    /// Like [`Console::wait_for`], returning the matched text.
    ///
    /// A write failure in the running hammer ends the wait as [`Error::Io`].
    pub fn wait_for_text(&mut self, rule: &MatchRule) -> Result<Option<String>> {
        let started = Instant::now();
        let mut chunk = [0u8; 512];
        debug!("Waiting for {:?}", rule.kind());

        loop {
            self.check_hammer()?;

            if let Some(text) = self
                .buffer
                .take_match(rule.kind())
            {
                debug!("Matched {:?} after {:?}", rule.pattern(), started.elapsed());
                return Ok(Some(text));
            }

            let waited = started.elapsed();
            match rule.timeout() {
                Some(limit) if waited >= limit => {
                    debug!("No {:?} within {}ms", rule.pattern(), limit.as_millis());
                    return Ok(None);
                },
                None => {
                    if let Some(limit) = self.watchdog {
                        if waited >= limit {
                            return Err(Error::Timeout(format!(
                                "watchdog expired after {}s waiting for {:?}",
                                limit.as_secs_f32(),
                                rule.pattern()
                            )));
                        }
                    }
                },
                Some(_) => {},
            }

            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            match self
                .port_mut()?
                .read(&mut chunk)
            {
                Ok(0) => {
                    return Err(Error::UnexpectedEof(format!(
                        "console closed while waiting for {:?}",
                        rule.pattern()
                    )));
                },
                Ok(n) => {
                    let text = self
                        .decoder
                        .push(&chunk[..n]);
                    trace!("< {:?}", clean_console_text(&text));
                    self.buffer
                        .push(&chunk[..n]);
                },
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Start repeating `payload` every `period` while this console is open.
    ///
    /// Only one hammer may run per console.
    pub fn start_hammer(&mut self, payload: impl Into<Vec<u8>>, period: Duration) -> Result<()> {
        if self
            .hammer
            .is_some()
        {
            return Err(Error::Protocol("a hammer is already running on this console".into()));
        }
        let writer = self
            .port_mut()?
            .try_clone_writer()?;
        self.hammer = Some(Hammer::start(writer, payload, period));
        Ok(())
    }

    /// Stop the running hammer, if any. Returns whether one was running.
    ///
    /// Fails with the hammer's write error if it stopped on one.
    pub fn stop_hammer(&mut self) -> Result<bool> {
        match self
            .hammer
            .take()
        {
            Some(hammer) => {
                hammer.finish()?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Fail if the running hammer has stopped on a write error.
    pub fn check_hammer(&self) -> Result<()> {
        match self
            .hammer
            .as_ref()
            .and_then(Hammer::take_error)
        {
            Some(e) => Err(Error::Io(e)),
            None => Ok(()),
        }
    }

    /// Whether a hammer is running on this console.
    pub fn hammer_running(&self) -> bool {
        self.hammer
            .is_some()
    }

    /// Stop any hammer and close the port.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let hammer = self.stop_hammer();
        if let Some(mut port) = self
            .port
            .take()
        {
            debug!("Closing console on {}", port.name());
            port.close()?;
        }
        hammer.map(|_| ())
    }
}

impl<P: Port> Drop for Console<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("Error closing console: {e}");
        }
    }
}

/// A raw-mode session, used for block transfers.
pub struct RawLink<'t, P: Port> {
    port: Option<P>,
    _transport: PhantomData<&'t mut ()>,
}

impl<'t, P: Port> RawLink<'t, P> {
    /// Open a raw link on `transport` at `baud_rate`.
    ///
    /// Reads time out after `read_timeout`.
    pub fn open<T>(transport: &'t mut T, baud_rate: u32, read_timeout: Duration) -> Result<Self>
    where
        T: Transport<Port = P>,
    {
        let mut port = transport.open(baud_rate)?;
        port.set_timeout(read_timeout)?;
        debug!("Raw link open on {} at {baud_rate} baud", port.name());
        Ok(Self {
            port: Some(port),
            _transport: PhantomData,
        })
    }

    fn io_port(&mut self) -> std::io::Result<&mut P> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "raw link closed"))
    }

    /// Close the port.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(mut port) = self
            .port
            .take()
        {
            debug!("Closing raw link on {}", port.name());
            port.close()?;
        }
        Ok(())
    }
}

impl<P: Port> Read for RawLink<'_, P> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.io_port()?
            .read(buf)
    }
}

impl<P: Port> Write for RawLink<'_, P> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.io_port()?
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.io_port()?
            .flush()
    }
}

impl<P: Port> Drop for RawLink<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("Error closing raw link: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::mock::{MockDevice, Step};

    #[test]
    fn test_line_wait_matches_banner() {
        let mut device = MockDevice::new(vec![
            Step::emit("DDR ok\r\n"),
            Step::emit("U-Boot 2010.06\r\n"),
        ]);
        let mut console = Console::open(&mut device, 115200).unwrap();
        let line = console
            .wait_for_text(&MatchRule::line_starts_with("U-Boot"))
            .unwrap();
        assert_eq!(line.as_deref(), Some("U-Boot 2010.06"));
        console.close().unwrap();

        assert_eq!(device.opens(), vec![115200]);
        assert_eq!(device.closes(), 1);
    }

    #[test]
    fn test_bounded_wait_times_out_not_early() {
        let mut device = MockDevice::new(vec![Step::emit("noise\r\n")]);
        let mut console = Console::open(&mut device, 115200).unwrap();

        let timeout = Duration::from_millis(80);
        let started = Instant::now();
        let found = console
            .wait_for(&MatchRule::line_starts_with("Press SPACE").with_timeout(timeout))
            .unwrap();
        let elapsed = started.elapsed();

        assert!(!found);
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + POLL_INTERVAL * 4, "overshoot: {elapsed:?}");
    }

    #[test]
    fn test_chunk_wait_across_reads() {
        let mut device = MockDevice::new(vec![Step::emit("...FAL"), Step::emit("CON => ")]);
        let mut console = Console::open(&mut device, 9600).unwrap();
        assert!(
            console
                .wait_for(&MatchRule::contains("FALCON"))
                .unwrap()
        );
    }

    #[test]
    fn test_watchdog_bounds_unbounded_wait() {
        let mut device = MockDevice::new(vec![]);
        let mut console = Console::open(&mut device, 115200)
            .unwrap()
            .with_watchdog(Some(Duration::from_millis(50)));
        let err = console
            .wait_for(&MatchRule::contains("FALCON"))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_end_of_stream_is_reported() {
        let mut device = MockDevice::new(vec![Step::emit("partial"), Step::Eof]);
        let mut console = Console::open(&mut device, 115200).unwrap();
        let err = console
            .wait_for(&MatchRule::contains("root@(none)"))
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof(_)));
    }

    #[test]
    fn test_drop_closes_port_and_stops_hammer() {
        let mut device = MockDevice::new(vec![]);
        {
            let mut console = Console::open(&mut device, 115200).unwrap();
            console
                .start_hammer(vec![0x03], Duration::from_millis(2))
                .unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(device.closes(), 1);
        assert_eq!(device.live_writers(), 0);
        let written = device
            .written()
            .len();
        assert!(written > 0);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(device.written().len(), written);
    }

    #[test]
    fn test_second_hammer_is_rejected() {
        let mut device = MockDevice::new(vec![]);
        let mut console = Console::open(&mut device, 115200).unwrap();
        console
            .start_hammer(b"\n".to_vec(), Duration::from_millis(5))
            .unwrap();
        assert!(
            console
                .start_hammer(b"\n".to_vec(), Duration::from_millis(5))
                .is_err()
        );
        assert!(console.stop_hammer().unwrap());
        assert!(!console.stop_hammer().unwrap());
    }

    #[test]
    fn test_hammer_write_error_ends_unbounded_wait() {
        let mut device = MockDevice::new(vec![]).fail_write_containing("\x03");
        {
            let mut console = Console::open(&mut device, 115200).unwrap();
            console
                .start_hammer(vec![0x03], Duration::from_millis(2))
                .unwrap();
            let err = console
                .wait_for(&MatchRule::line_starts_with("U-Boot"))
                .unwrap_err();
            assert!(err.is_transport());
        }
        assert_eq!(device.closes(), 1);
        assert_eq!(device.live_writers(), 0);
    }

    #[test]
    fn test_stop_hammer_reports_write_error() {
        let mut device = MockDevice::new(vec![]).fail_write_containing("f\n");
        let mut console = Console::open(&mut device, 115200).unwrap();
        console
            .start_hammer(b"f\n".to_vec(), Duration::from_millis(2))
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(matches!(console.stop_hammer(), Err(Error::Io(_))));
        assert!(!console.hammer_running());
    }

    #[test]
    fn test_raw_link_passes_bytes_through() {
        let mut device = MockDevice::new(vec![Step::emit("C")]);
        let mut link = RawLink::open(&mut device, 115200, Duration::from_millis(20)).unwrap();
        link.write_all(b"\x01\x00\xff").unwrap();
        let mut buf = [0u8; 4];
        let n = link
            .read(&mut buf)
            .unwrap();
        assert_eq!(&buf[..n], b"C");
        link.close().unwrap();

        assert_eq!(device.written(), b"\x01\x00\xff");
        assert_eq!(device.closes(), 1);
    }
}
