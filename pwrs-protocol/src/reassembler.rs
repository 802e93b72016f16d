//! Receive-side frame reassembly
//!
//! The receiver works one de-escaped symbol at a time:
//!
//! ```text
//! IDLE ──FrameStart──▶ COMMAND ──known code──▶ LEN ──0──────────────▶ CHECKSUM ──▶ IDLE
//!                         │                     └──n──▶ DATA ──n bytes──▶┘
//!                         └──unknown code──▶ IDLE
//! ```
//!
//! A `FrameStart` in any state abandons whatever was in flight, so at most
//! one frame is ever being assembled. Bytes outside a frame are ignored,
//! which is all the resynchronisation a mid-stream connection needs.

use heapless::Vec;

use crate::frame::{checksum, Frame, FrameError, MAX_PAYLOAD_SIZE};
use crate::messages::Command;
use crate::slip::{SlipDecoder, Symbol};

/// Reassembly state
///
/// Each variant carries everything collected so far, so [`transition`] can
/// be a plain function of state and input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RxState {
    /// Waiting for a frame start
    #[default]
    Idle,
    /// Got frame start, waiting for COMMAND
    Command,
    /// Got COMMAND, waiting for LENGTH
    Length { command: Command },
    /// Reading `length` payload bytes
    Data {
        command: Command,
        length: u8,
        payload: Vec<u8, MAX_PAYLOAD_SIZE>,
    },
    /// Payload complete, waiting for CHECKSUM
    Checksum {
        command: Command,
        payload: Vec<u8, MAX_PAYLOAD_SIZE>,
    },
}

/// Advance the reassembler by one symbol
///
/// Returns the next state and `Ok(Some(frame))` when a checksum-verified
/// frame completes, `Ok(None)` when more input is needed, or `Err` when the
/// frame in flight was dropped. Every error leaves the machine in `Idle`.
pub fn transition(state: RxState, symbol: Symbol) -> (RxState, Result<Option<Frame>, FrameError>) {
    let byte = match symbol {
        Symbol::FrameStart => return (RxState::Command, Ok(None)),
        Symbol::Data(byte) => byte,
    };

    match state {
        RxState::Idle => (RxState::Idle, Ok(None)),
        RxState::Command => match Command::from_byte(byte) {
            Some(command) => (RxState::Length { command }, Ok(None)),
            None => (RxState::Idle, Err(FrameError::UnknownCommand)),
        },
        RxState::Length { command } => {
            if usize::from(byte) > MAX_PAYLOAD_SIZE {
                return (RxState::Idle, Err(FrameError::PayloadTooLarge));
            }
            let payload = Vec::new();
            if byte == 0 {
                (RxState::Checksum { command, payload }, Ok(None))
            } else {
                let next = RxState::Data {
                    command,
                    length: byte,
                    payload,
                };
                (next, Ok(None))
            }
        }
        RxState::Data {
            command,
            length,
            mut payload,
        } => {
            if payload.push(byte).is_err() {
                return (RxState::Idle, Err(FrameError::PayloadTooLarge));
            }
            if payload.len() == usize::from(length) {
                (RxState::Checksum { command, payload }, Ok(None))
            } else {
                let next = RxState::Data {
                    command,
                    length,
                    payload,
                };
                (next, Ok(None))
            }
        }
        RxState::Checksum { command, payload } => {
            let length = payload.len() as u8;
            if byte == checksum(command.to_byte(), length, &payload) {
                (RxState::Idle, Ok(Some(Frame { command, payload })))
            } else {
                (RxState::Idle, Err(FrameError::InvalidChecksum))
            }
        }
    }
}

/// State machine for assembling frames from de-escaped symbols
#[derive(Debug, Clone, Default)]
pub struct Reassembler {
    state: RxState,
}

impl Reassembler {
    /// Create a new reassembler
    pub fn new() -> Self {
        Self {
            state: RxState::Idle,
        }
    }

    /// Abandon any frame in flight
    pub fn reset(&mut self) {
        self.state = RxState::Idle;
    }

    /// Current state
    pub fn state(&self) -> &RxState {
        &self.state
    }

    /// True when no frame is in flight
    pub fn is_idle(&self) -> bool {
        self.state == RxState::Idle
    }

    /// Feed a single symbol, see [`transition`]
    pub fn feed(&mut self, symbol: Symbol) -> Result<Option<Frame>, FrameError> {
        let (next, result) = transition(core::mem::take(&mut self.state), symbol);
        self.state = next;
        result
    }
}

/// Raw wire bytes in, verified frames out
///
/// Combines the byte-stuffing decoder with the [`Reassembler`]. A malformed
/// escape drops the frame in flight.
#[derive(Debug, Clone, Default)]
pub struct FrameReceiver {
    decoder: SlipDecoder,
    reassembler: Reassembler,
}

impl FrameReceiver {
    /// Create a new frame receiver
    pub fn new() -> Self {
        Self {
            decoder: SlipDecoder::new(),
            reassembler: Reassembler::new(),
        }
    }

    /// Reset the receiver state
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.reassembler.reset();
    }

    /// True when no frame is in flight
    pub fn is_idle(&self) -> bool {
        self.reassembler.is_idle() && !self.decoder.is_escaped()
    }

    /// Feed a single raw byte
    ///
    /// Returns `Ok(Some(frame))` when a complete valid frame is parsed,
    /// `Ok(None)` when more bytes are needed, or `Err` when a frame was
    /// dropped.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Frame>, FrameError> {
        match self.decoder.feed(byte) {
            Ok(Some(symbol)) => self.reassembler.feed(symbol),
            Ok(None) => Ok(None),
            Err(e) => {
                self.reassembler.reset();
                Err(e)
            }
        }
    }
}
