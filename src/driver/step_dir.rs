//! Step/direction driver (A4988, DRV8825, TMC in legacy mode and similar).

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::config::{DriverParameters, Microsteps};
use crate::error::{Error, MotorError, Result};
use crate::motion::Direction;
use crate::waveform::{Pulse, PulsePattern};

use super::{check_line, Driver, MicrostepReadiness};

/// Placeholder for drivers whose enable input is hard-wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnable;

impl ErrorType for NoEnable {
    type Error = Infallible;
}

impl OutputPin for NoEnable {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// Driver for step/direction interfaces.
///
/// STEP and DIR are GPIO lines played by the waveform backend, so a direction
/// change lands exactly between the two steps it separates. The optional
/// enable input (active low) is an embedded-hal pin driven directly.
#[derive(Debug)]
pub struct StepDirDriver<EN = NoEnable>
where
    EN: OutputPin,
{
    parameters: DriverParameters,
    step_line: u8,
    dir_line: u8,
    enable: EN,
    invert_direction: bool,
    direction: Direction,
    /// DIR level must be (re)written before the next step.
    direction_dirty: bool,
    microsteps: Microsteps,
    pulse_length_us: u32,
    min_pulse_gap_us: u32,
    direction_settle_us: u32,
}

impl StepDirDriver<NoEnable> {
    /// Create a driver on the given STEP and DIR lines, without enable pin.
    pub fn new(step_line: u8, dir_line: u8) -> Self {
        Self::with_enable(step_line, dir_line, NoEnable)
    }
}

impl<EN> StepDirDriver<EN>
where
    EN: OutputPin,
{
    /// Create a driver with an enable pin.
    pub fn with_enable(step_line: u8, dir_line: u8, enable: EN) -> Self {
        let parameters = DriverParameters {
            max_speed: 1000.0,
            max_torque_speed: 100.0,
            acceleration: 2000.0,
            deceleration: 3000.0,
            full_steps_per_rev: 400,
            ..Default::default()
        }
        .with_name("Generic Step / Direction driver");

        Self {
            microsteps: parameters.microstep_default,
            parameters,
            step_line,
            dir_line,
            enable,
            invert_direction: false,
            direction: Direction::Clockwise,
            direction_dirty: true,
            pulse_length_us: 10,
            min_pulse_gap_us: 10,
            direction_settle_us: 10,
        }
    }

    /// Drive DIR low for clockwise instead of high.
    pub fn invert_direction(mut self, invert: bool) -> Self {
        self.invert_direction = invert;
        self
    }

    /// Set STEP pulse width, minimum low time and DIR setup time.
    pub fn with_timing(mut self, pulse_length_us: u32, min_gap_us: u32, settle_us: u32) -> Self {
        self.pulse_length_us = pulse_length_us;
        self.min_pulse_gap_us = min_gap_us;
        self.direction_settle_us = settle_us;
        self
    }

    /// Give back the enable pin.
    pub fn into_enable(self) -> EN {
        self.enable
    }

    fn dir_high(&self) -> bool {
        (self.direction == Direction::Clockwise) != self.invert_direction
    }
}

impl<EN> Driver for StepDirDriver<EN>
where
    EN: OutputPin + Send,
{
    fn parameters(&self) -> &DriverParameters {
        &self.parameters
    }

    fn init(&mut self) -> Result<()> {
        check_line(self.step_line)?;
        check_line(self.dir_line)?;
        self.direction_dirty = true;
        self.release()
    }

    fn engage(&mut self) -> Result<()> {
        self.enable
            .set_low()
            .map_err(|_| Error::Motor(MotorError::PinError))
    }

    fn release(&mut self) -> Result<()> {
        self.enable
            .set_high()
            .map_err(|_| Error::Motor(MotorError::PinError))
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        if direction != self.direction {
            self.direction = direction;
            self.direction_dirty = true;
        }
        Ok(())
    }

    fn perform_step(&mut self, delay_us: u32) -> PulsePattern {
        let mut pattern = PulsePattern::new();

        if self.direction_dirty {
            let settle = self.direction_settle_us;
            pattern.push(if self.dir_high() {
                Pulse::high(self.dir_line, settle)
            } else {
                Pulse::low(self.dir_line, settle)
            });
            self.direction_dirty = false;
        }

        let gap = delay_us
            .saturating_sub(self.pulse_length_us)
            .max(self.min_pulse_gap_us);
        pattern.push(Pulse::high(self.step_line, self.pulse_length_us));
        pattern.push(Pulse::low(self.step_line, gap));
        pattern
    }

    fn microsteps(&self) -> Microsteps {
        self.microsteps
    }

    fn steps_until_change_microsteps(&self, _requested: Microsteps) -> MicrostepReadiness {
        // microstep inputs are strapped in hardware
        MicrostepReadiness::Unsupported
    }

    fn apply_microsteps(&mut self, _value: Microsteps) -> bool {
        false
    }
}
