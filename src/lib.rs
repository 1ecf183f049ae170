//! # cnc-motion
//!
//! Motion-execution core for CNC firmware: a look-ahead motion planner
//! coupled to an interrupt-driven stepper executor, with the serial
//! protocol and settings store that operate them.
//!
//! ## Features
//!
//! - **Look-ahead planning**: queued moves join at the highest safe
//!   junction speed under the configured acceleration and junction
//!   deviation
//! - **Interrupt-driven stepping**: Bresenham multi-axis pulse
//!   generation with a trapezoidal rate controller, including resumable
//!   feed hold
//! - **Hardware-agnostic**: step/direction port, timers and non-volatile
//!   storage live behind traits; pins map onto `embedded-hal` 1.0
//! - **no_std compatible**: the core runs without the standard library
//! - **Serial protocol**: line-oriented g-code intake with real-time
//!   command bytes, `$` system commands and status reports
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use cnc_motion::{Hal, Machine, Settings};
//!
//! let mut machine = Machine::from_storage(&mut eeprom, &mut serial_out);
//! let mut hal = Hal { port, timer, delay, nv: eeprom };
//! machine.startup_reset(&mut hal, &mut serial_out);
//!
//! // main loop
//! loop {
//!     while let Some(byte) = serial_in.read() {
//!         machine.process_byte(byte, &mut hal, &mut serial_out, &mut wait_hook);
//!     }
//!     if machine.poll(&mut hal, &mut serial_out) {
//!         machine.startup_reset(&mut hal, &mut serial_out);
//!     }
//! }
//! ```
//!
//! The step and pulse timer interrupts call
//! [`Machine::step_interrupt`] and [`Machine::pulse_reset_interrupt`].
//!
//! ## Feature flags
//!
//! - `std` (default): host-side conveniences and `std::error::Error`
//!   impls
//! - `defmt`: `defmt::Format` derives on the state types for embedded
//!   logging

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

// Core modules
pub mod error;
pub mod gcode;
pub mod planner;
pub mod protocol;
pub mod runtime;
pub mod settings;
pub mod sim;
pub mod stepper;
pub mod system;

// Re-exports for ergonomic API
pub use error::{Alarm, Error, ParseError, Result, SettingError, StateError};
pub use planner::{Block, BlockBuffer, Planner, BLOCK_BUFFER_SIZE};
pub use runtime::{Hal, Machine};
pub use settings::{MemoryStore, NonVolatile, Settings};
pub use stepper::{HalStepPort, PortBits, StepPort, StepTimer, Stepper};
pub use system::{Exec, MachineState, Pending, SystemState, N_AXIS};
