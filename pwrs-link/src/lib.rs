//! Host-side link to the motor controller
//!
//! Owns the serial device, turns speed commands into frames and drains
//! incoming telemetry into a cache the control loop can read at any time.
//!
//! ```text
//! send_speed ──▶ Message ──▶ Frame ──▶ escape ──▶ serial port
//! serial port ──▶ poll ──▶ de-escape ──▶ reassemble ──▶ dispatch ──▶ TelemetryCache
//! ```
//!
//! The link is single-threaded and poll-driven. There is no reader thread:
//! the control loop calls [`Link::poll`] once per tick and bytes wait in the
//! OS receive buffer in between. Nothing here blocks waiting for input.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod link;
pub mod port;
pub mod sim;

pub use config::LinkConfig;
pub use error::{ConfigError, LinkError};
pub use link::{abort_on_fault, FatalHandler, Link, LinkStats};
pub use port::SerialDevice;
pub use sim::SimulatedPort;

pub use pwrs_core::{Fault, MotorSelector, MAX_SPEED};
pub use pwrs_protocol::Side;
