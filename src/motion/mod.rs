//! Motion module for stepper-engine.
//!
//! Provides the real-time acceleration ramp and the position/target model the
//! engine drives it with.

mod position;
mod ramp;

pub use position::{PendingMicrosteps, PositionModel, Target};
pub use ramp::{Direction, Ramp, RampState, Remaining, DEFAULT_TARGET_SPEED};
