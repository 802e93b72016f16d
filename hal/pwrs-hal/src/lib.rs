//! PWRS Hardware Abstraction Layer
//!
//! This crate defines the serial port traits the motor controller link is
//! written against. The host driver implements them on top of a real serial
//! device; the simulator implements them in memory. This lets the same link
//! code run against hardware, a bench simulation, or a unit test.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Link driver (pwrs-link)                │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  pwrs-hal (this crate - traits)         │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ SerialDevice  │       │ SimulatedPort │
//! │ (serialport)  │       │  (in-memory)  │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`uart::UartTx`], [`uart::UartRx`] - Serial communication

#![no_std]
#![deny(unsafe_code)]

pub mod uart;

pub use uart::{DataBits, FlowControl, Parity, StopBits, Uart, UartConfig, UartRx, UartTx};
