//! Byte stuffing for the serial link.
//!
//! The serial port has no framing of its own, so one byte value is reserved
//! to mark the start of a frame. Any occurrence of that value (or of the
//! escape byte itself) inside a frame is replaced by a two byte sequence:
//!
//! | Data byte   | On the wire                  |
//! |-------------|------------------------------|
//! | `DELIMITER` | `ESCAPE`, `ESCAPE_DELIM`     |
//! | `ESCAPE`    | `ESCAPE`, `ESCAPE_ESCAPE`    |
//! | other       | unchanged                    |

use heapless::Vec;

use crate::frame::FrameError;

/// Start-of-frame marker
pub const DELIMITER: u8 = 0xC0;

/// Escape introducer
pub const ESCAPE: u8 = 0xDB;

/// Follows `ESCAPE` to stand for a data `DELIMITER`
pub const ESCAPE_DELIM: u8 = 0xDC;

/// Follows `ESCAPE` to stand for a data `ESCAPE`
pub const ESCAPE_ESCAPE: u8 = 0xDD;

/// Append one data byte to `out`, escaping it if needed
pub fn encode_byte<const N: usize>(byte: u8, out: &mut Vec<u8, N>) -> Result<(), FrameError> {
    let result = match byte {
        DELIMITER => out.extend_from_slice(&[ESCAPE, ESCAPE_DELIM]),
        ESCAPE => out.extend_from_slice(&[ESCAPE, ESCAPE_ESCAPE]),
        _ => out.push(byte).map_err(|_| ()),
    };
    result.map_err(|_| FrameError::BufferTooSmall)
}

/// A decoded unit of the receive stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Symbol {
    /// An unescaped `DELIMITER`: a new frame begins
    FrameStart,
    /// One de-escaped data byte
    Data(u8),
}

/// Incremental de-escaper
///
/// Holds a single bit of state: whether the previous byte was `ESCAPE`.
#[derive(Debug, Clone, Default)]
pub struct SlipDecoder {
    escaped: bool,
}

impl SlipDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self { escaped: false }
    }

    /// Forget a pending escape
    pub fn reset(&mut self) {
        self.escaped = false;
    }

    /// True if the last byte fed was an `ESCAPE` awaiting its partner
    pub fn is_escaped(&self) -> bool {
        self.escaped
    }

    /// Feed a single raw byte from the wire
    ///
    /// Returns `Ok(None)` for the first half of an escape sequence and
    /// `Err(FrameError::InvalidEscape)` if `ESCAPE` is followed by anything
    /// other than `ESCAPE_DELIM` or `ESCAPE_ESCAPE`.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Symbol>, FrameError> {
        // A bare delimiter always starts a frame, even mid-escape
        if byte == DELIMITER {
            self.escaped = false;
            return Ok(Some(Symbol::FrameStart));
        }

        if self.escaped {
            self.escaped = false;
            return match byte {
                ESCAPE_DELIM => Ok(Some(Symbol::Data(DELIMITER))),
                ESCAPE_ESCAPE => Ok(Some(Symbol::Data(ESCAPE))),
                _ => Err(FrameError::InvalidEscape),
            };
        }

        if byte == ESCAPE {
            self.escaped = true;
            Ok(None)
        } else {
            Ok(Some(Symbol::Data(byte)))
        }
    }
}
