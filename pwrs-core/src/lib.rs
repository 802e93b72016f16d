//! Board-agnostic logic for the motor controller link
//!
//! This crate contains everything between the wire protocol and the serial
//! device that does not need an operating system:
//!
//! - Motor selection, speed clamping and travel-limit hints
//! - Telemetry cache and the dispatcher that feeds it from indications

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod motor;
pub mod telemetry;

pub use motor::{clamp_speed, clicks_hint, MotorSelector, MAX_SPEED};
pub use telemetry::{Dispatch, Fault, TelemetryCache};
