//! Link configuration
//!
//! Read from the `[link]` table of a TOML file:
//!
//! ```toml
//! [link]
//! device = "/dev/ttyACM0"
//! baud_rate = 115200
//! flow_control = true
//! max_speed = 320
//! read_chunk = 256
//! simulate = false
//! ```
//!
//! Every key is optional; missing keys take the defaults shown.

use std::fs;
use std::path::Path;

use log::debug;
use pwrs_core::MAX_SPEED;
use pwrs_hal::{FlowControl, UartConfig};
use serde::Deserialize;

use crate::error::ConfigError;

/// Default serial device: the controller board's USB CDC port
pub const DEFAULT_DEVICE: &str = "/dev/ttyACM0";

/// Baud rate the controller firmware runs at
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Bytes requested from the port per read
pub const DEFAULT_READ_CHUNK: usize = 256;

/// Link settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Serial device path
    pub device: String,
    /// Baud rate in bits per second
    pub baud_rate: u32,
    /// RTS/CTS hardware flow control
    pub flow_control: bool,
    /// Speed commands are clamped to ±this
    pub max_speed: i16,
    /// Receive buffer size per read
    pub read_chunk: usize,
    /// Log set-points instead of opening the serial device
    pub simulate: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_owned(),
            baud_rate: DEFAULT_BAUD_RATE,
            flow_control: true,
            max_speed: MAX_SPEED,
            read_chunk: DEFAULT_READ_CHUNK,
            simulate: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    link: LinkConfig,
}

impl LinkConfig {
    /// Config for `device` with every other setting at its default
    pub fn for_device(device: &str) -> Self {
        Self {
            device: device.to_owned(),
            ..Self::default()
        }
    }

    /// Parse from TOML text
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(input)?;
        file.link.validate()?;
        Ok(file.link)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Read {} bytes of config from {}", text.len(), path.display());
        Self::from_toml_str(&text)
    }

    /// Check values the type system cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.is_empty() && !self.simulate {
            return Err(ConfigError::Invalid("device must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive"));
        }
        if self.max_speed <= 0 {
            return Err(ConfigError::Invalid("max_speed must be positive"));
        }
        if self.read_chunk == 0 {
            return Err(ConfigError::Invalid("read_chunk must be positive"));
        }
        Ok(())
    }

    /// Wire settings for the serial device: 8-N-1, raw
    pub fn uart_config(&self) -> UartConfig {
        UartConfig {
            baudrate: self.baud_rate,
            flow_control: if self.flow_control {
                FlowControl::Hardware
            } else {
                FlowControl::None
            },
            ..UartConfig::default()
        }
    }
}
