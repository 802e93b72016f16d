//! Frame layout and checksum.
//!
//! Frame format (before byte stuffing):
//! - COMMAND (1 byte): command code, see [`Command`]
//! - LENGTH (1 byte): payload length (0-254)
//! - PAYLOAD (0-254 bytes): command-specific data
//! - CHECKSUM (1 byte): 0xFF XOR COMMAND XOR LENGTH XOR every PAYLOAD byte
//!
//! On the wire the frame is preceded by [`DELIMITER`] and every byte above
//! is escaped.

use heapless::Vec;

use crate::messages::Command;
use crate::slip::{encode_byte, DELIMITER};

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 254;

/// Initial value of the XOR fold
pub const CHECKSUM_SEED: u8 = 0xFF;

/// Worst-case encoded frame: the delimiter, then every byte escaped
pub const MAX_ENCODED_FRAME_SIZE: usize = 1 + 2 * (1 + 1 + MAX_PAYLOAD_SIZE + 1);

/// Errors that can occur during frame parsing or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Checksum mismatch
    InvalidChecksum,
    /// Command code outside the known set
    UnknownCommand,
    /// `ESCAPE` followed by a byte other than `ESCAPE_DELIM`/`ESCAPE_ESCAPE`
    InvalidEscape,
    /// LENGTH does not match the payload size of the command
    LengthMismatch,
    /// Payload field holds a value the command does not allow
    InvalidFrame,
    /// Buffer too small for encoding
    BufferTooSmall,
}

/// Compute the frame checksum
///
/// Sender and receiver must fold the same bytes in the same order from the
/// same seed; the controller firmware does exactly this.
pub fn checksum(command: u8, length: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(CHECKSUM_SEED ^ command ^ length, |acc, &byte| acc ^ byte)
}

/// A parsed or constructed frame
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    /// Command code
    pub command: Command,
    /// Payload data
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Frame {
    /// Create a new frame with the given command and payload
    pub fn new(command: Command, payload: &[u8]) -> Result<Self, FrameError> {
        let mut payload_vec = Vec::new();
        payload_vec
            .extend_from_slice(payload)
            .map_err(|_| FrameError::PayloadTooLarge)?;

        Ok(Self {
            command,
            payload: payload_vec,
        })
    }

    /// Create a frame with no payload
    pub fn empty(command: Command) -> Self {
        Self {
            command,
            payload: Vec::new(),
        }
    }

    /// Value of the LENGTH field
    pub fn length(&self) -> u8 {
        // Capacity is 254, so this never truncates
        self.payload.len() as u8
    }

    /// Value of the CHECKSUM field
    pub fn checksum(&self) -> u8 {
        checksum(self.command.to_byte(), self.length(), &self.payload)
    }

    /// Encode this frame into wire bytes: delimiter plus escaped body
    pub fn encode(&self) -> Result<Vec<u8, MAX_ENCODED_FRAME_SIZE>, FrameError> {
        let mut out = Vec::new();
        out.push(DELIMITER).map_err(|_| FrameError::BufferTooSmall)?;

        encode_byte(self.command.to_byte(), &mut out)?;
        encode_byte(self.length(), &mut out)?;
        for &byte in &self.payload {
            encode_byte(byte, &mut out)?;
        }
        encode_byte(self.checksum(), &mut out)?;

        Ok(out)
    }
}
