//! Native serial port implementation using the `serialport` crate.
//!
//! This module provides the serial port implementation for native platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortEnumerator, PortInfo, SerialConfig, Transport},
    },
    log::{debug, trace},
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    timeout: Duration,
    baud_rate: u32,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        debug!("Opened {} at {} baud", config.port_name, config.baud_rate);

        Ok(Self {
            port: Some(port),
            name: config
                .port_name
                .clone(),
            timeout: config.timeout,
            baud_rate: config.baud_rate,
        })
    }

    /// Open a serial port with default settings.
    pub fn open_simple(port_name: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig::new(port_name, baud_rate);
        Self::open(&config)
    }

    fn closed_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed")
    }
}

impl Port for NativePort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.set_timeout(timeout)?;
        }
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
        &self.name
    }

    fn try_clone_writer(&self) -> Result<Box<dyn Write + Send>> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(Self::closed_error)?;
        let clone = port.try_clone()?;
        trace!("Cloned write handle for {}", self.name);
        Ok(Box::new(clone))
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes the descriptor
        if self
            .port
            .take()
            .is_some()
        {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|p| p.read(buf))
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(std::io::Write::flush)
    }
}

/// Opens [`NativePort`]s on one serial device.
#[derive(Debug, Clone)]
pub struct NativeTransport {
    config: SerialConfig,
}

impl NativeTransport {
    /// Transport for `port_name` with default line settings.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            config: SerialConfig::new(port_name, crate::port::DEFAULT_BAUD),
        }
    }
}

impl Transport for NativeTransport {
    type Port = NativePort;

    fn open(&mut self, baud_rate: u32) -> Result<NativePort> {
        let config = self
            .config
            .clone()
            .with_baud_rate(baud_rate);
        NativePort::open(&config)
    }

    fn name(&self) -> &str {
        &self
            .config
            .port_name
    }
}

/// Native port enumerator.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let (vid, pid, manufacturer, product) = match &p.port_type {
                    serialport::SerialPortType::UsbPort(info) => (
                        Some(info.vid),
                        Some(info.pid),
                        info.manufacturer
                            .clone(),
                        info.product
                            .clone(),
                    ),
                    _ => (None, None, None, None),
                };

                PortInfo {
                    name: p.port_name,
                    vid,
                    pid,
                    manufacturer,
                    product,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // This test just verifies that list_ports doesn't panic
        let _ = NativePortEnumerator::list_ports();
    }

    #[test]
    fn test_transport_keeps_name() {
        let transport = NativeTransport::new("/dev/ttyUSB0");
        assert_eq!(transport.name(), "/dev/ttyUSB0");
    }

    #[test]
    fn test_open_missing_device_fails() {
        let mut transport = NativeTransport::new("/dev/sfproot-does-not-exist");
        assert!(transport.open(115200).is_err());
    }
}
