//! Message types for the motor controller protocol
//!
//! Command codes are small sequential integers starting at 0. A receiver
//! rejects any code at or above [`COMMAND_COUNT`], so adding a command is a
//! protocol version bump on both sides.
//!
//! - Host → Controller: speed set-points
//! - Controller → Host: speed echo, motor current, current overflow, range
//!
//! All multi-byte fields are little-endian.

use crate::frame::{Frame, FrameError};

/// Number of known command codes
pub const COMMAND_COUNT: u8 = 5;

/// Payload size of [`SpeedRequest`]
pub const SPEED_REQUEST_LEN: usize = 8;
/// Payload size of [`SpeedIndication`]
pub const SPEED_INDICATION_LEN: usize = 7;
/// Payload size of [`CurrentOverflowIndication`]
pub const CURRENT_OVERFLOW_LEN: usize = 1;
/// Payload size of [`CurrentIndication`]
pub const CURRENT_INDICATION_LEN: usize = 3;
/// Payload size of [`RangeIndication`]
pub const RANGE_INDICATION_LEN: usize = 3;

/// Command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Host asks the controller to run a motor at a speed
    SpeedRequest = 0,
    /// Controller echoes the speed it is running a motor at
    SpeedIndication = 1,
    /// Controller's current sense saturated
    CurrentOverflowIndication = 2,
    /// Periodic motor current sample
    CurrentIndication = 3,
    /// Periodic ultrasonic round-trip time
    RangeIndication = 4,
}

impl Command {
    /// Parse a command code, rejecting anything outside the known set
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Command::SpeedRequest),
            1 => Some(Command::SpeedIndication),
            2 => Some(Command::CurrentOverflowIndication),
            3 => Some(Command::CurrentIndication),
            4 => Some(Command::RangeIndication),
            _ => None,
        }
    }

    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Payload size this command must carry
    pub fn payload_len(self) -> usize {
        match self {
            Command::SpeedRequest => SPEED_REQUEST_LEN,
            Command::SpeedIndication => SPEED_INDICATION_LEN,
            Command::CurrentOverflowIndication => CURRENT_OVERFLOW_LEN,
            Command::CurrentIndication => CURRENT_INDICATION_LEN,
            Command::RangeIndication => RANGE_INDICATION_LEN,
        }
    }

    /// Returns true for controller-originated messages
    pub fn is_indication(self) -> bool {
        !matches!(self, Command::SpeedRequest)
    }
}

/// Which drive motor a speed message refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Parse a side from its wire format byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Side::Left),
            1 => Some(Side::Right),
            _ => None,
        }
    }

    /// Convert to wire format byte
    pub fn to_byte(self) -> u8 {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    /// Index into per-side arrays
    pub fn index(self) -> usize {
        usize::from(self.to_byte())
    }
}

/// Speed set-point for one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedRequest {
    /// Host-assigned sequence number. Informational only: the controller
    /// does not acknowledge requests.
    pub ctx: u32,
    pub side: Side,
    /// Stop after this many encoder clicks
    pub clicks: u8,
    /// Clicks per second, positive is forwards
    pub speed: i16,
}

/// Speed the controller reports running a motor at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedIndication {
    pub ctx: u32,
    pub side: Side,
    pub speed: i16,
}

/// Current sense overflow on a motor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentOverflowIndication {
    pub motor: u8,
}

/// Raw motor current sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentIndication {
    /// ADC code
    pub current: u16,
    /// Channel 0..3
    pub motor: u8,
}

/// Raw ultrasonic range sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RangeIndication {
    /// Echo round-trip time in microseconds
    pub range: u16,
    /// Sensor 0..2
    pub sensor: u8,
}

/// Any protocol message, in either direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    SpeedRequest(SpeedRequest),
    SpeedIndication(SpeedIndication),
    CurrentOverflow(CurrentOverflowIndication),
    Current(CurrentIndication),
    Range(RangeIndication),
}

impl Message {
    /// Command code this message travels under
    pub fn command(&self) -> Command {
        match self {
            Message::SpeedRequest(_) => Command::SpeedRequest,
            Message::SpeedIndication(_) => Command::SpeedIndication,
            Message::CurrentOverflow(_) => Command::CurrentOverflowIndication,
            Message::Current(_) => Command::CurrentIndication,
            Message::Range(_) => Command::RangeIndication,
        }
    }

    /// Encode this message into a frame
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let command = self.command();
        match self {
            Message::SpeedRequest(req) => {
                let [c0, c1, c2, c3] = req.ctx.to_le_bytes();
                let [s0, s1] = req.speed.to_le_bytes();
                Frame::new(
                    command,
                    &[c0, c1, c2, c3, req.side.to_byte(), req.clicks, s0, s1],
                )
            }
            Message::SpeedIndication(ind) => {
                let [c0, c1, c2, c3] = ind.ctx.to_le_bytes();
                let [s0, s1] = ind.speed.to_le_bytes();
                Frame::new(command, &[c0, c1, c2, c3, ind.side.to_byte(), s0, s1])
            }
            Message::CurrentOverflow(ind) => Frame::new(command, &[ind.motor]),
            Message::Current(ind) => {
                let [i0, i1] = ind.current.to_le_bytes();
                Frame::new(command, &[i0, i1, ind.motor])
            }
            Message::Range(ind) => {
                let [r0, r1] = ind.range.to_le_bytes();
                Frame::new(command, &[r0, r1, ind.sensor])
            }
        }
    }

    /// Parse a message from a checksum-verified frame
    ///
    /// The payload length is checked against the command before any field
    /// is read.
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let payload = frame.payload.as_slice();
        if payload.len() != frame.command.payload_len() {
            return Err(FrameError::LengthMismatch);
        }

        let message = match (frame.command, payload) {
            (Command::SpeedRequest, &[c0, c1, c2, c3, side, clicks, s0, s1]) => {
                Message::SpeedRequest(SpeedRequest {
                    ctx: u32::from_le_bytes([c0, c1, c2, c3]),
                    side: Side::from_byte(side).ok_or(FrameError::InvalidFrame)?,
                    clicks,
                    speed: i16::from_le_bytes([s0, s1]),
                })
            }
            (Command::SpeedIndication, &[c0, c1, c2, c3, side, s0, s1]) => {
                Message::SpeedIndication(SpeedIndication {
                    ctx: u32::from_le_bytes([c0, c1, c2, c3]),
                    side: Side::from_byte(side).ok_or(FrameError::InvalidFrame)?,
                    speed: i16::from_le_bytes([s0, s1]),
                })
            }
            (Command::CurrentOverflowIndication, &[motor]) => {
                Message::CurrentOverflow(CurrentOverflowIndication { motor })
            }
            (Command::CurrentIndication, &[i0, i1, motor]) => Message::Current(CurrentIndication {
                current: u16::from_le_bytes([i0, i1]),
                motor,
            }),
            (Command::RangeIndication, &[r0, r1, sensor]) => Message::Range(RangeIndication {
                range: u16::from_le_bytes([r0, r1]),
                sensor,
            }),
            _ => return Err(FrameError::LengthMismatch),
        };

        Ok(message)
    }
}
