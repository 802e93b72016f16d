//! Motor Controller Link Protocol
//!
//! This crate defines the serial protocol between the robot's host computer
//! and the real-time motor controller (an 8-bit microcontroller that closes
//! the speed loop and samples motor current and ultrasonic range).
//!
//! # Protocol Overview
//!
//! Every message is one frame, introduced by a delimiter byte:
//! ```text
//! ┌───────────┬─────────┬────────┬─────────────┬──────────┐
//! │ DELIMITER │ COMMAND │ LENGTH │ PAYLOAD     │ CHECKSUM │
//! │ 0xC0      │ 1B      │ 1B     │ 0–254B      │ 1B       │
//! └───────────┴─────────┴────────┴─────────────┴──────────┘
//! ```
//!
//! Everything after the delimiter is byte-stuffed (SLIP style) so that the
//! delimiter never appears inside a frame. The checksum is an XOR fold of
//! COMMAND, LENGTH and PAYLOAD seeded with 0xFF.
//!
//! The byte values, command codes and payload layouts are shared with the
//! controller firmware and must change in lockstep with it.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

pub mod frame;
pub mod messages;
pub mod reassembler;
pub mod slip;

pub use frame::{checksum, Frame, FrameError, MAX_ENCODED_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use messages::{
    Command, CurrentIndication, CurrentOverflowIndication, Message, RangeIndication, Side,
    SpeedIndication, SpeedRequest, COMMAND_COUNT,
};
pub use reassembler::{transition, FrameReceiver, Reassembler, RxState};
pub use slip::{SlipDecoder, Symbol, DELIMITER, ESCAPE, ESCAPE_DELIM, ESCAPE_ESCAPE};
