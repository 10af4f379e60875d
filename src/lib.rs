//! # stepper-engine
//!
//! Real-time stepper motor motion engine with embedded-hal 1.0 support.
//!
//! ## Features
//!
//! - **Austin ramp**: Step intervals computed one step at a time, so speed,
//!   target and direction can change during a move
//! - **Asymmetric profiles**: Independent acceleration and deceleration rates
//! - **Hardware-timed pulses**: Steps are played by a double-buffered waveform
//!   backend, never by sleeping threads
//! - **Background engine**: A dedicated thread runs the motor; the
//!   [`Stepper`] handle talks to it through typed commands
//! - **Microstep changes**: Switched in sync with the driver at the position it
//!   allows, with positions and rates rescaled
//! - **Configuration-driven**: Driver parameter overrides and engine timing in
//!   TOML files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepper_engine::{Direction, Stepper};
//! use stepper_engine::driver::UnipolarDriver;
//! use stepper_engine::waveform::SimulatedWaveform;
//!
//! let config = stepper_engine::load_config("stepper.toml")?;
//!
//! let stepper = Stepper::builder()
//!     .driver(UnipolarDriver::byj48(pink, orange, yellow, blue))
//!     .backend(SimulatedWaveform::new())
//!     .config(config)
//!     .build()?;
//!
//! stepper.move_to_deg(90.0, true)?;
//! stepper.run(Direction::Clockwise, Some(500.0))?;
//! stepper.stop(true)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables the engine thread, the control handle, the
//!   simulated backend and TOML loading
//! - `defmt`: Enables defmt formatting for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

// Core modules
pub mod config;
pub mod driver;
pub mod error;
pub mod motion;
pub mod waveform;

// Engine thread and control handle (std only)
#[cfg(feature = "std")]
pub mod engine;
#[cfg(feature = "std")]
pub mod motor;

// Re-exports for ergonomic API
pub use config::{
    validate_config, DriverParameters, EngineConfig, ParameterOverrides, StepperConfig,
};
pub use error::{Error, Result};
pub use motion::{Direction, Target};

#[cfg(feature = "std")]
pub use engine::MicrostepChange;
#[cfg(feature = "std")]
pub use motor::{Stepper, StepperBuilder};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::load_config;

// Unit types
pub use config::units::{Degrees, Microsteps, Steps};
