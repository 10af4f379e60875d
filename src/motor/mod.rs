//! Control side of a stepper motor.
//!
//! [`StepperBuilder`] starts an engine thread for a driver and waveform
//! backend; the resulting [`Stepper`] handle talks to it over the command
//! channel.

mod builder;
mod handle;

pub use builder::StepperBuilder;
pub use handle::Stepper;
