//! Driver without hardware.

use crate::config::{DriverParameters, Microsteps};
use crate::error::Result;
use crate::motion::Direction;
use crate::waveform::PulsePattern;

use super::{Driver, MicrostepReadiness};

/// A driver that touches no GPIO.
///
/// Every step is a plain delay, which makes the step timing visible on a
/// waveform backend without any motor attached.
#[derive(Debug, Clone)]
pub struct DebugDriver {
    parameters: DriverParameters,
    engaged: bool,
    direction: Direction,
    microsteps: Microsteps,
    steps: u64,
}

impl DebugDriver {
    /// Create a driver with the default parameter set.
    pub fn new() -> Self {
        Self::with_parameters(DriverParameters::default())
    }

    /// Create a driver describing a different motor.
    pub fn with_parameters(parameters: DriverParameters) -> Self {
        let microsteps = parameters.microstep_default;
        Self {
            parameters,
            engaged: false,
            direction: Direction::Clockwise,
            microsteps,
            steps: 0,
        }
    }

    /// Whether the (imaginary) coils are energized.
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Last direction set by the engine.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of steps performed so far.
    pub fn steps_performed(&self) -> u64 {
        self.steps
    }
}

impl Default for DebugDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for DebugDriver {
    fn parameters(&self) -> &DriverParameters {
        &self.parameters
    }

    fn engage(&mut self) -> Result<()> {
        self.engaged = true;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.engaged = false;
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        self.direction = direction;
        Ok(())
    }

    fn perform_step(&mut self, delay_us: u32) -> PulsePattern {
        self.steps += 1;
        PulsePattern::delay(delay_us)
    }

    fn microsteps(&self) -> Microsteps {
        self.microsteps
    }

    fn steps_until_change_microsteps(&self, requested: Microsteps) -> MicrostepReadiness {
        if self.parameters.supports_microsteps(requested.value()) {
            MicrostepReadiness::Now
        } else {
            MicrostepReadiness::Unsupported
        }
    }

    fn apply_microsteps(&mut self, value: Microsteps) -> bool {
        if self.parameters.supports_microsteps(value.value()) {
            self.microsteps = value;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::Pulse;

    #[test]
    fn test_step_is_single_delay() {
        let mut driver = DebugDriver::new();
        let pattern = driver.perform_step(1234);

        assert_eq!(pattern.pulses(), &[Pulse::delay(1234)]);
        assert_eq!(driver.steps_performed(), 1);
    }

    #[test]
    fn test_engage_release() {
        let mut driver = DebugDriver::new();
        driver.engage().unwrap();
        assert!(driver.is_engaged());

        driver.hard_stop().unwrap();
        assert!(!driver.is_engaged());
    }

    #[test]
    fn test_microsteps_follow_parameters() {
        let mut driver = DebugDriver::new();
        assert_eq!(
            driver.steps_until_change_microsteps(Microsteps::FULL),
            MicrostepReadiness::Now
        );
        assert_eq!(
            driver.steps_until_change_microsteps(Microsteps::HALF),
            MicrostepReadiness::Unsupported
        );
        assert!(!driver.apply_microsteps(Microsteps::HALF));
        assert_eq!(driver.microsteps(), Microsteps::FULL);
    }
}
