//! Motor drivers.
//!
//! A driver knows how to turn one step into GPIO activity for a particular
//! kind of hardware. Coil and enable lines that are set outside a step are
//! driven directly through embedded-hal pins; the step itself is returned as a
//! [`PulsePattern`] for the waveform backend to play with precise timing.

mod debug;
mod step_dir;
mod unipolar;

pub use debug::DebugDriver;
pub use step_dir::{NoEnable, StepDirDriver};
pub use unipolar::{Coil, StepSequence, UnipolarDriver};

use crate::config::{DriverParameters, Microsteps};
use crate::error::{Error, MotorError, Result};
use crate::motion::Direction;
use crate::waveform::{PulsePattern, MAX_LINES};

/// Whether a driver can switch to a requested microstep setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MicrostepReadiness {
    /// The change can be applied right away.
    Now,
    /// The change can be applied after this many more steps.
    AfterSteps(u32),
    /// The driver cannot use this setting.
    Unsupported,
}

/// Hardware-specific stepping.
pub trait Driver: Send {
    /// Static description of the driver and motor.
    fn parameters(&self) -> &DriverParameters;

    /// Bring the GPIO lines into a known state. Called once, before the
    /// engine starts.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Energize the motor so it holds its position.
    fn engage(&mut self) -> Result<()>;

    /// De-energize the motor.
    fn release(&mut self) -> Result<()>;

    /// Stop as fast as the hardware allows.
    fn hard_stop(&mut self) -> Result<()> {
        self.release()
    }

    /// Set the direction of the following steps.
    fn set_direction(&mut self, direction: Direction) -> Result<()>;

    /// Pulse pattern for one step, followed by `delay_us` until the next.
    fn perform_step(&mut self, delay_us: u32) -> PulsePattern;

    /// Active microstep setting.
    fn microsteps(&self) -> Microsteps;

    /// Whether, and when, the driver can switch to `requested`.
    fn steps_until_change_microsteps(&self, requested: Microsteps) -> MicrostepReadiness;

    /// Switch to a new microstep setting. Returns `false` if the driver
    /// cannot switch at its current sequence position.
    fn apply_microsteps(&mut self, value: Microsteps) -> bool;
}

/// Reject a GPIO line that a pulse mask cannot address.
fn check_line(line: u8) -> Result<()> {
    if line < MAX_LINES {
        Ok(())
    } else {
        Err(Error::Motor(MotorError::LineOutOfRange(line)))
    }
}
