//! Link and configuration errors

use std::io;
use std::path::PathBuf;

use pwrs_protocol::FrameError;
use thiserror::Error;

/// Errors surfaced to the caller of the link
///
/// Corrupt or unexpected incoming frames are not errors at this level: they
/// are logged, counted in [`LinkStats`](crate::LinkStats) and dropped.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No usable serial device: the path could not be opened, or the link
    /// was never opened or has been closed
    #[error("no motor controller device: {detail}")]
    NoDevice {
        detail: String,
        #[source]
        source: Option<serialport::Error>,
    },
    /// The operating system failed a read or write
    #[error("serial I/O error")]
    Serial(#[from] io::Error),
    /// The port accepted only part of a frame
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    /// A message could not be framed
    #[error("frame encoding failed: {0:?}")]
    Encode(FrameError),
}

impl LinkError {
    pub(crate) fn not_open() -> Self {
        LinkError::NoDevice {
            detail: "link is not open".to_owned(),
            source: None,
        }
    }

    /// True for [`LinkError::NoDevice`]
    pub fn is_no_device(&self) -> bool {
        matches!(self, LinkError::NoDevice { .. })
    }

    /// True for OS-level read/write failures, short writes included
    pub fn is_serial(&self) -> bool {
        matches!(self, LinkError::Serial(_) | LinkError::ShortWrite { .. })
    }
}

/// Errors loading a [`LinkConfig`](crate::LinkConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Config file is not valid TOML for this schema
    #[error("config parse error")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
