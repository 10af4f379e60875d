//! Unipolar motors switched directly through four coil outputs.
//!
//! Typical hardware is a ULN2003 darlington array in front of a 28BYJ-48.

use embedded_hal::digital::OutputPin;

use crate::config::{DriverParameters, Microsteps};
use crate::error::{Error, MotorError, Result};
use crate::motion::Direction;
use crate::waveform::{Pulse, PulsePattern};

use super::{check_line, Driver, MicrostepReadiness};

/// One coil output: its GPIO line for the waveform and its pin for direct writes.
#[derive(Debug)]
pub struct Coil<P> {
    /// GPIO line number.
    pub line: u8,
    /// The pin driving the same line.
    pub pin: P,
}

impl<P> Coil<P> {
    /// Pair a GPIO line with its pin.
    pub fn new(line: u8, pin: P) -> Self {
        Self { line, pin }
    }
}

/// Coil energizing sequence.
///
/// Each entry is a bit set over the coils in the order A+, B+, A-, B-, so a
/// sequence reads like a wave travelling around the stator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepSequence {
    /// One coil at a time. Less torque than [`StepSequence::Full`].
    Wave,
    /// Two coils at a time.
    Full,
    /// Alternating one and two coils, twice the resolution.
    Half,
}

const WAVE: [u8; 4] = [0b0001, 0b0010, 0b0100, 0b1000];
const FULL: [u8; 4] = [0b0011, 0b0110, 0b1100, 0b1001];
const HALF: [u8; 8] = [
    0b0011, 0b0010, 0b0110, 0b0100, 0b1100, 0b1000, 0b1001, 0b0001,
];

impl StepSequence {
    /// Coil states of this sequence.
    pub fn table(self) -> &'static [u8] {
        match self {
            StepSequence::Wave => &WAVE,
            StepSequence::Full => &FULL,
            StepSequence::Half => &HALF,
        }
    }

    /// Microstep setting the sequence corresponds to.
    pub fn microsteps(self) -> Microsteps {
        match self {
            StepSequence::Wave | StepSequence::Full => Microsteps::FULL,
            StepSequence::Half => Microsteps::HALF,
        }
    }
}

/// Driver for unipolar motors.
pub struct UnipolarDriver<P>
where
    P: OutputPin,
{
    parameters: DriverParameters,
    /// In sequence order A+, B+, A-, B-.
    coils: [Coil<P>; 4],
    sequence: StepSequence,
    /// Sequence used for full steps (wave or two-coil).
    full_sequence: StepSequence,
    position: usize,
    direction: Direction,
}

impl<P> UnipolarDriver<P>
where
    P: OutputPin,
{
    /// Create a driver from the four coil outputs, named as on motor datasheets.
    pub fn new(a_plus: Coil<P>, a_minus: Coil<P>, b_plus: Coil<P>, b_minus: Coil<P>) -> Self {
        let parameters = DriverParameters {
            max_speed: 800.0,
            max_torque_speed: 100.0,
            acceleration: 2000.0,
            deceleration: 3000.0,
            full_steps_per_rev: 400,
            ..Default::default()
        }
        .with_name("Generic Unipolar")
        .with_microsteps(&[Microsteps::FULL, Microsteps::HALF], Microsteps::FULL);

        Self::with_parameters(a_plus, a_minus, b_plus, b_minus, parameters)
    }

    /// A 28BYJ-48 geared motor, wired by wire colour.
    ///
    /// Pink/orange are A+/A-, yellow/blue are B+/B-. The motor runs in half
    /// steps by default.
    pub fn byj48(pink: Coil<P>, orange: Coil<P>, yellow: Coil<P>, blue: Coil<P>) -> Self {
        let parameters = DriverParameters {
            max_speed: 650.0,
            max_torque_speed: 120.0,
            acceleration: 2000.0,
            deceleration: 3000.0,
            full_steps_per_rev: 2048,
            ..Default::default()
        }
        .with_name("28BYJ-48")
        .with_microsteps(&[Microsteps::FULL, Microsteps::HALF], Microsteps::HALF);

        Self::with_parameters(pink, orange, yellow, blue, parameters)
    }

    /// Create a driver with a custom parameter set.
    pub fn with_parameters(
        a_plus: Coil<P>,
        a_minus: Coil<P>,
        b_plus: Coil<P>,
        b_minus: Coil<P>,
        parameters: DriverParameters,
    ) -> Self {
        let sequence = if parameters.microstep_default == Microsteps::HALF {
            StepSequence::Half
        } else {
            StepSequence::Full
        };

        Self {
            parameters,
            coils: [a_plus, b_plus, a_minus, b_minus],
            sequence,
            full_sequence: StepSequence::Full,
            position: 0,
            direction: Direction::Clockwise,
        }
    }

    /// Energize one coil at a time for full steps.
    pub fn wave_drive(mut self, enabled: bool) -> Self {
        self.full_sequence = if enabled {
            StepSequence::Wave
        } else {
            StepSequence::Full
        };
        if self.sequence != StepSequence::Half {
            self.sequence = self.full_sequence;
        }
        self
    }

    /// Active sequence.
    pub fn sequence(&self) -> StepSequence {
        self.sequence
    }

    /// Index into the active sequence.
    pub fn sequence_position(&self) -> usize {
        self.position
    }

    /// Give back the coil outputs in the order A+, A-, B+, B-.
    pub fn into_coils(self) -> [Coil<P>; 4] {
        let [a_plus, b_plus, a_minus, b_minus] = self.coils;
        [a_plus, a_minus, b_plus, b_minus]
    }

    fn write_coils(&mut self, state: u8) -> Result<()> {
        for (i, coil) in self.coils.iter_mut().enumerate() {
            let result = if state & (1 << i) != 0 {
                coil.pin.set_high()
            } else {
                coil.pin.set_low()
            };
            result.map_err(|_| Error::Motor(MotorError::PinError))?;
        }
        Ok(())
    }
}

impl<P> Driver for UnipolarDriver<P>
where
    P: OutputPin + Send,
{
    fn parameters(&self) -> &DriverParameters {
        &self.parameters
    }

    fn init(&mut self) -> Result<()> {
        for coil in &self.coils {
            check_line(coil.line)?;
        }
        self.position = 0;
        self.direction = Direction::Clockwise;
        self.write_coils(0)
    }

    fn engage(&mut self) -> Result<()> {
        let state = self.sequence.table()[self.position];
        self.write_coils(state)
    }

    fn release(&mut self) -> Result<()> {
        self.write_coils(0)
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        self.direction = direction;
        Ok(())
    }

    fn perform_step(&mut self, delay_us: u32) -> PulsePattern {
        let table = self.sequence.table();
        let len = table.len() as i64;
        let next = (self.position as i64 + self.direction.sign()).rem_euclid(len) as usize;

        let current_state = table[self.position];
        let next_state = table[next];
        self.position = next;

        let mut pattern = PulsePattern::delay(delay_us);
        for (i, coil) in self.coils.iter().enumerate() {
            let mask = 1 << i;
            match (current_state & mask != 0, next_state & mask != 0) {
                (true, false) => pattern.push(Pulse::low(coil.line, 0)),
                (false, true) => pattern.push(Pulse::high(coil.line, 0)),
                _ => {}
            }
        }
        pattern
    }

    fn microsteps(&self) -> Microsteps {
        self.sequence.microsteps()
    }

    fn steps_until_change_microsteps(&self, requested: Microsteps) -> MicrostepReadiness {
        match requested {
            Microsteps::HALF => MicrostepReadiness::Now,
            Microsteps::FULL if self.sequence != StepSequence::Half => MicrostepReadiness::Now,
            // half to full only lines up on the two-coil entries
            Microsteps::FULL if self.position % 2 == 0 => MicrostepReadiness::Now,
            Microsteps::FULL => MicrostepReadiness::AfterSteps(1),
            _ => MicrostepReadiness::Unsupported,
        }
    }

    fn apply_microsteps(&mut self, value: Microsteps) -> bool {
        match value {
            Microsteps::HALF => {
                if self.sequence != StepSequence::Half {
                    self.sequence = StepSequence::Half;
                    self.position *= 2;
                }
                true
            }
            Microsteps::FULL => {
                if self.sequence == StepSequence::Half {
                    if self.position % 2 == 1 {
                        return false;
                    }
                    self.sequence = self.full_sequence;
                    self.position /= 2;
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};

    fn idle_coils() -> [Coil<PinMock>; 4] {
        [
            Coil::new(18, PinMock::new(&[])),
            Coil::new(14, PinMock::new(&[])),
            Coil::new(15, PinMock::new(&[])),
            Coil::new(17, PinMock::new(&[])),
        ]
    }

    fn driver() -> UnipolarDriver<PinMock> {
        let [a_plus, a_minus, b_plus, b_minus] = idle_coils();
        UnipolarDriver::new(a_plus, a_minus, b_plus, b_minus)
    }

    fn finish(driver: UnipolarDriver<PinMock>) {
        for mut coil in driver.into_coils() {
            coil.pin.done();
        }
    }

    #[test]
    fn test_defaults() {
        let d = driver();
        assert_eq!(d.parameters().name.as_str(), "Generic Unipolar");
        assert_eq!(d.parameters().max_speed, 800.0);
        assert_eq!(d.sequence(), StepSequence::Full);
        assert_eq!(d.microsteps(), Microsteps::FULL);
        finish(d);
    }

    #[test]
    fn test_byj48_preset() {
        let [pink, orange, yellow, blue] = idle_coils();
        let d = UnipolarDriver::byj48(pink, orange, yellow, blue);

        assert_eq!(d.parameters().full_steps_per_rev, 2048);
        assert_eq!(d.parameters().max_speed, 650.0);
        assert_eq!(d.parameters().max_torque_speed, 120.0);
        assert_eq!(d.sequence(), StepSequence::Half);
        finish(d);
    }

    #[test]
    fn test_full_step_pattern() {
        // A+ = 18, B+ = 15, A- = 14, B- = 17
        let mut d = driver();

        // [1,1,0,0] -> [0,1,1,0]: A+ off, A- on
        let pattern = d.perform_step(2000);
        assert_eq!(
            pattern.pulses(),
            &[Pulse::delay(2000), Pulse::low(18, 0), Pulse::high(14, 0)]
        );
        assert_eq!(d.sequence_position(), 1);

        d.set_direction(Direction::CounterClockwise).unwrap();
        d.perform_step(2000);
        // wraps from 0 to the last entry
        d.perform_step(2000);
        assert_eq!(d.sequence_position(), 3);
        finish(d);
    }

    #[test]
    fn test_half_step_changes_one_coil() {
        let mut d = driver();
        assert!(d.apply_microsteps(Microsteps::HALF));

        for _ in 0..16 {
            let pattern = d.perform_step(1000);
            assert_eq!(pattern.pulses().len(), 2);
        }
        finish(d);
    }

    #[test]
    fn test_wave_drive() {
        let mut d = driver().wave_drive(true);
        assert_eq!(d.sequence(), StepSequence::Wave);

        // [1,0,0,0] -> [0,1,0,0]
        let pattern = d.perform_step(500);
        assert_eq!(
            pattern.pulses(),
            &[Pulse::delay(500), Pulse::low(18, 0), Pulse::high(15, 0)]
        );
        finish(d);
    }

    #[test]
    fn test_half_to_full_needs_even_position() {
        let mut d = driver();
        assert!(d.apply_microsteps(Microsteps::HALF));
        d.perform_step(1000);
        assert_eq!(d.sequence_position(), 1);

        assert_eq!(
            d.steps_until_change_microsteps(Microsteps::FULL),
            MicrostepReadiness::AfterSteps(1)
        );
        assert!(!d.apply_microsteps(Microsteps::FULL));

        d.perform_step(1000);
        assert_eq!(
            d.steps_until_change_microsteps(Microsteps::FULL),
            MicrostepReadiness::Now
        );
        assert!(d.apply_microsteps(Microsteps::FULL));
        assert_eq!(d.sequence_position(), 1);
        assert_eq!(
            d.steps_until_change_microsteps(Microsteps::QUARTER),
            MicrostepReadiness::Unsupported
        );
        finish(d);
    }

    #[test]
    fn test_engage_writes_current_sequence() {
        let on_then_off = [
            PinTransaction::set(State::High),
            PinTransaction::set(State::Low),
        ];
        let always_off = [
            PinTransaction::set(State::Low),
            PinTransaction::set(State::Low),
        ];
        let mut d = UnipolarDriver::new(
            Coil::new(18, PinMock::new(&on_then_off)),
            Coil::new(14, PinMock::new(&always_off)),
            Coil::new(15, PinMock::new(&on_then_off)),
            Coil::new(17, PinMock::new(&always_off)),
        );

        // position 0 of the full sequence energizes A+ and B+
        d.engage().unwrap();
        d.release().unwrap();
        finish(d);
    }
}
