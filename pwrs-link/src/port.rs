//! Serial device backed by the `serialport` crate
//!
//! Opened read/write in raw mode. Reads only ever ask for the bytes the
//! driver already holds, so they return immediately. Writes are allowed a
//! short timeout for the driver to accept the frame.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, info};
use pwrs_hal::{DataBits, FlowControl, Parity, StopBits, UartConfig, UartRx, UartTx};
use serialport::{ClearBuffer, SerialPort};

use crate::error::LinkError;

/// How long a write may wait for the driver to take the bytes
const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// An open serial device
pub struct SerialDevice {
    port: Box<dyn SerialPort>,
    path: String,
}

impl core::fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialDevice")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SerialDevice {
    /// Open and configure the device at `path`
    ///
    /// Anything already sitting in the receive buffer is discarded so the
    /// first poll starts from fresh data.
    pub fn open(path: &str, config: &UartConfig) -> Result<Self, LinkError> {
        let port = serialport::new(path, config.baudrate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .parity(to_serialport_parity(config.parity))
            .stop_bits(to_serialport_stop_bits(config.stop_bits))
            .flow_control(to_serialport_flow_control(config.flow_control))
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(|source| LinkError::NoDevice {
                detail: format!("cannot open {path}"),
                source: Some(source),
            })?;

        let mut device = Self {
            port,
            path: path.to_owned(),
        };
        device.discard_input()?;

        info!("Opened {} at {} baud", path, config.baudrate);
        Ok(device)
    }

    /// Device path this port was opened from
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl UartTx for SerialDevice {
    type Error = io::Error;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        self.port.write(data)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.port.flush()
    }
}

impl UartRx for SerialDevice {
    type Error = io::Error;

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)?;
        let wanted = buf.len().min(pending as usize);
        if wanted == 0 {
            return Ok(0);
        }

        match self.port.read(&mut buf[..wanted]) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn discard_input(&mut self) -> Result<(), Self::Error> {
        debug!("Flushing receive buffer of {}", self.path);
        self.port
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn to_serialport_data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn to_serialport_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

fn to_serialport_stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

fn to_serialport_flow_control(flow: FlowControl) -> serialport::FlowControl {
    match flow {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
    }
}
