//! Connection parameters for the one transport this crate drives: a serial
//! link (§6). A generic `Communicator` trait plus `SerialCommunicator`/
//! `NoOpCommunicator` implementations were dropped —
//! [`crate::transport::SerialTransport`] drives [`serial::SerialPort`]
//! directly and has no caller left for a second abstraction layer sitting
//! above it (see `DESIGN.md`). The line-framing, NUL/XON/XOFF stripping,
//! and reconnect-on-failure behavior required by §4.1 live in
//! [`crate::transport`].

pub mod serial;

use cncctl_core::{Error, Result};
use serde::{Deserialize, Serialize};

pub use serial::{list_ports, SerialPortInfo};

/// Serial port parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    None,
    Even,
    Odd,
}

/// Parameters needed to open a serial connection to a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// 115200 by default (§6).
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub flow_control: bool,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: SerialParity,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            timeout_ms: 50,
            flow_control: false,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
        }
    }
}

impl ConnectionParams {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(Error::invalid_argument("serial port name cannot be empty"));
        }
        if self.baud_rate == 0 {
            return Err(Error::invalid_argument("baud rate must be > 0"));
        }
        if self.data_bits == 0 || self.data_bits > 8 {
            return Err(Error::invalid_argument("data bits must be 5-8"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_params_validate_rejects_empty_port() {
        let params = ConnectionParams::new("");
        assert!(params.validate().is_err());
    }

    #[test]
    fn connection_params_validate_rejects_zero_baud() {
        let mut params = ConnectionParams::new("/dev/fake0");
        params.baud_rate = 0;
        assert!(params.validate().is_err());
    }
}
