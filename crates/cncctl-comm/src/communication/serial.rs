//! Raw serial port I/O.
//!
//! Deliberately thin: [`SerialPort`] exposes blocking read/write only, so
//! that [`crate::transport::SerialTransport`] stays agnostic to whether
//! bytes come from real hardware or [`MockSerialPort`] in tests.

use super::{ConnectionParams, SerialParity};
use cncctl_core::{Error, Result};
use std::io::{self, Read, Write};
use std::time::Duration;

/// One entry from [`list_ports`].
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub description: String,
    pub manufacturer: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// Enumerate serial ports visible to the OS.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| Error::comm(format!("failed to enumerate ports: {e}")))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (description, manufacturer, vid, pid) = match &p.port_type {
                serialport::SerialPortType::UsbPort(usb) => (
                    format!(
                        "USB {} {}",
                        usb.manufacturer.as_deref().unwrap_or("Device"),
                        usb.product.as_deref().unwrap_or("Serial Port")
                    ),
                    usb.manufacturer.clone(),
                    Some(usb.vid),
                    Some(usb.pid),
                ),
                _ => ("Serial Port".to_string(), None, None, None),
            };
            SerialPortInfo {
                port_name: p.port_name,
                description,
                manufacturer,
                vid,
                pid,
            }
        })
        .collect())
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Blocking serial port interface, implemented by real hardware and by
/// [`MockSerialPort`] for tests.
pub trait SerialPort: Send {
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn close(&mut self) -> io::Result<()>;
}

trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

/// Real serial port, backed by the `serialport` crate.
pub struct RealSerialPort {
    port: Box<dyn ReadWrite>,
}

impl RealSerialPort {
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => return Err(Error::invalid_argument(format!("invalid data bits: {other}"))),
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => return Err(Error::invalid_argument(format!("invalid stop bits: {other}"))),
        };

        let builder = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.timeout_ms.max(1)))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            });

        tracing::info!(port = %params.port, baud = params.baud_rate, "opening serial port");

        let port = builder
            .open_native()
            .map_err(|e| Error::comm(format!("failed to open port {}: {e}", params.port)))?;

        Ok(Self {
            port: Box::new(port),
        })
    }
}

impl SerialPort for RealSerialPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory serial port double for deterministic tests: queue up bytes for
/// `read` to return, and inspect whatever was `write`n.
pub struct MockSerialPort {
    to_read: std::collections::VecDeque<u8>,
    written: Vec<u8>,
    closed: bool,
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self {
            to_read: std::collections::VecDeque::new(),
            written: Vec::new(),
            closed: false,
        }
    }

    /// Queue bytes (e.g. a firmware response) for subsequent `read` calls.
    pub fn push_read_data(&mut self, data: &[u8]) {
        self.to_read.extend(data.iter().copied());
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn clear_written(&mut self) {
        self.written.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for MockSerialPort {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialPort for MockSerialPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(data);
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.to_read.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_serial_port_round_trips() {
        let mut port = MockSerialPort::new();
        port.push_read_data(b"ok\r\n");
        let mut buf = [0u8; 16];
        let n = port.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ok\r\n");

        port.write(b"G0 X10\n").unwrap();
        assert_eq!(port.written(), b"G0 X10\n");
    }
}
