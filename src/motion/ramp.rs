//! Austin-style real-time acceleration ramp.
//!
//! The ramp is driven one step at a time: every call to [`Ramp::next_delay`]
//! returns the interval until the following step, derived from the previous
//! interval with the recurrence `c_n = c_(n-1) - 2·c_(n-1) / (4n + 1)`.
//! Speed changes, target changes and reversals are all absorbed on the fly,
//! so the caller never plans a move up front.

use libm::{round, sqrt};

use crate::error::ArgumentError;

/// Interval constant from the Austin paper, compensating the error of the
/// first step of the recurrence.
const C0_FACTOR: f64 = 0.676;

/// Ratio between the first accelerated interval and `c_0` (`1 - 2/5`).
const FIRST_STEP_RATIO: f64 = 0.6;

/// Speed used until the application sets one.
pub const DEFAULT_TARGET_SPEED: f64 = 100.0;

/// Direction of motor motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Clockwise (positive step count).
    Clockwise,
    /// Counter-clockwise (negative step count).
    CounterClockwise,
}

impl Direction {
    /// Get direction from signed step count. Zero counts as clockwise.
    #[inline]
    pub fn from_steps(steps: i64) -> Self {
        if steps >= 0 {
            Direction::Clockwise
        } else {
            Direction::CounterClockwise
        }
    }

    /// Get the sign multiplier.
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
        }
    }

    /// The opposite direction.
    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            Direction::Clockwise => Direction::CounterClockwise,
            Direction::CounterClockwise => Direction::Clockwise,
        }
    }
}

/// Phase of the ramp state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampState {
    /// Coils released, nothing scheduled.
    Idle,
    /// Stopped with the coils still engaged.
    Stop,
    /// Accelerating from rest.
    Accel,
    /// Speeding up to a higher target speed while already moving.
    Inc,
    /// Running at the target speed.
    Run,
    /// Slowing down to a lower, non-zero target speed.
    Dec,
    /// Decelerating to rest.
    Decel,
}

impl RampState {
    /// Whether the motor is stepping in this state.
    #[inline]
    pub fn is_moving(self) -> bool {
        !matches!(self, RampState::Idle | RampState::Stop)
    }
}

/// Distance left to the target, as seen by the ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Remaining {
    /// A finite signed number of steps.
    Finite(i64),
    /// Continuous motion: infinitely far away in this direction.
    Unbounded(Direction),
}

impl Remaining {
    /// Whether the target has been reached.
    #[inline]
    pub fn is_zero(self) -> bool {
        self == Remaining::Finite(0)
    }

    /// Direction toward the target, `None` when already there.
    #[inline]
    pub fn direction(self) -> Option<Direction> {
        match self {
            Remaining::Finite(0) => None,
            Remaining::Finite(delta) => Some(Direction::from_steps(delta)),
            Remaining::Unbounded(direction) => Some(direction),
        }
    }

    /// Whether the target lies within `steps` of the current position.
    #[inline]
    pub fn within(self, steps: i64) -> bool {
        match self {
            Remaining::Finite(delta) => delta.unsigned_abs() <= steps.max(0) as u64,
            Remaining::Unbounded(_) => false,
        }
    }
}

/// Ramp controller state.
///
/// Owned by the engine; every field changes only through the methods below.
#[derive(Debug, Clone)]
pub struct Ramp {
    state: RampState,
    direction: Option<Direction>,
    /// Interval of the step just computed (µs).
    c_n: f64,
    c_0: f64,
    c_target: f64,
    target_speed: f64,
    speed: f64,
    /// Position on the acceleration curve; negative while decelerating.
    step: i64,
    decel_steps: i64,
    acceleration: f64,
    deceleration: f64,
}

impl Ramp {
    /// Create an idle ramp.
    ///
    /// # Errors
    ///
    /// Rejects non-positive or non-finite rates.
    pub fn new(acceleration: f64, deceleration: f64) -> Result<Self, ArgumentError> {
        if !is_positive(acceleration) {
            return Err(ArgumentError::InvalidAcceleration(acceleration));
        }
        if !is_positive(deceleration) {
            return Err(ArgumentError::InvalidDeceleration(deceleration));
        }

        Ok(Self {
            state: RampState::Idle,
            direction: None,
            c_n: 0.0,
            c_0: initial_interval(acceleration),
            c_target: 1_000_000.0 / DEFAULT_TARGET_SPEED,
            target_speed: DEFAULT_TARGET_SPEED,
            speed: 0.0,
            step: 0,
            decel_steps: 0,
            acceleration,
            deceleration,
        })
    }

    /// Current state machine phase.
    #[inline]
    pub fn state(&self) -> RampState {
        self.state
    }

    /// Direction of the last step, `None` before the first move.
    #[inline]
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    /// Set the direction of travel at the start of a move.
    #[inline]
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = Some(direction);
    }

    /// Achieved speed in steps per second.
    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Requested speed in steps per second.
    #[inline]
    pub fn target_speed(&self) -> f64 {
        self.target_speed
    }

    /// Acceleration rate in steps/s².
    #[inline]
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Deceleration rate in steps/s².
    #[inline]
    pub fn deceleration(&self) -> f64 {
        self.deceleration
    }

    /// Steps needed to come to rest from the current speed.
    #[inline]
    pub fn decel_steps(&self) -> i64 {
        self.decel_steps
    }

    /// Signed position on the acceleration curve.
    #[inline]
    pub fn step(&self) -> i64 {
        self.step
    }

    /// Interval of the last computed step in microseconds.
    #[inline]
    pub fn interval(&self) -> f64 {
        self.c_n
    }

    /// Interval of the first step from rest in microseconds.
    #[inline]
    pub fn initial_interval(&self) -> f64 {
        self.c_0
    }

    /// Compute the delay until the next step.
    ///
    /// Returns `None` once the target is reached and the motor has come to
    /// rest. The caller commits exactly one step in [`Ramp::direction`] for
    /// each returned delay.
    pub fn next_delay(&mut self, remaining: Remaining) -> Option<u32> {
        self.decel_steps = (self.speed * self.speed / (2.0 * self.deceleration)) as i64;

        // The creep clause stops the motor at speeds it could also start from;
        // without it a fast acceleration can keep overshooting a slow-decel target.
        let creeping = self.c_n >= FIRST_STEP_RATIO * self.c_0;
        if remaining.is_zero() && (self.decel_steps <= 1 || creeping) {
            self.speed = 0.0;
            self.step = 0;
            self.state = RampState::Stop;
            return None;
        }

        let toward = remaining.direction();
        let reversing = matches!(
            (toward, self.direction),
            (Some(toward), Some(current)) if toward != current
        );

        if reversing || (remaining.within(self.decel_steps) && self.state != RampState::Decel) {
            self.state = RampState::Decel;
            self.step = -self.decel_steps;
        }

        if self.step == 0 {
            // starting from rest, or at the inflection point of a reversal
            self.c_n = self.c_0;
            self.step = 1;
            if self.state == RampState::Decel || self.direction.is_none() {
                if let Some(toward) = toward {
                    self.direction = Some(toward);
                }
            }
            self.state = RampState::Accel;
        } else {
            match self.state {
                RampState::Accel | RampState::Inc => {
                    self.c_n -= 2.0 * self.c_n / (4.0 * self.step as f64 + 1.0);
                    if self.c_n <= self.c_target {
                        self.c_n = self.c_target;
                        self.state = RampState::Run;
                    } else {
                        self.step += 1;
                    }
                }
                RampState::Decel | RampState::Dec => {
                    self.c_n -= 2.0 * self.c_n / (4.0 * self.step as f64 + 1.0);
                    self.step += 1;
                    if self.state == RampState::Dec && self.c_n >= self.c_target {
                        self.c_n = self.c_target;
                        self.state = RampState::Run;
                    }
                }
                RampState::Run | RampState::Idle | RampState::Stop => {}
            }
        }

        self.speed = 1_000_000.0 / self.c_n;
        Some(round(self.c_n).max(1.0) as u32)
    }

    /// Change the target speed, re-entering the ramp if already running.
    ///
    /// # Errors
    ///
    /// Rejects non-positive or non-finite speeds, leaving the ramp unchanged.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), ArgumentError> {
        if !is_positive(speed) {
            return Err(ArgumentError::InvalidSpeed(speed));
        }

        let old = self.target_speed;
        if speed == old {
            return Ok(());
        }

        if speed > old && matches!(self.state, RampState::Run | RampState::Dec) {
            self.step = (speed * speed / (2.0 * self.acceleration)) as i64;
            self.state = RampState::Inc;
        } else if speed < old && matches!(self.state, RampState::Run | RampState::Inc) {
            self.step = -((speed * speed / (2.0 * self.deceleration)) as i64);
            self.state = RampState::Dec;
        }

        self.c_target = 1_000_000.0 / speed;
        self.target_speed = speed;
        Ok(())
    }

    /// Change the acceleration rate, keeping the current speed on the curve.
    ///
    /// # Errors
    ///
    /// Rejects non-positive or non-finite rates, leaving the ramp unchanged.
    pub fn set_acceleration(&mut self, rate: f64) -> Result<(), ArgumentError> {
        if !is_positive(rate) {
            return Err(ArgumentError::InvalidAcceleration(rate));
        }

        self.step = rescale_step(self.step, self.acceleration / rate);
        self.c_0 = initial_interval(rate);
        self.acceleration = rate;
        Ok(())
    }

    /// Change the deceleration rate.
    ///
    /// # Errors
    ///
    /// Rejects non-positive or non-finite rates, leaving the ramp unchanged.
    pub fn set_deceleration(&mut self, rate: f64) -> Result<(), ArgumentError> {
        if !is_positive(rate) {
            return Err(ArgumentError::InvalidDeceleration(rate));
        }

        self.deceleration = rate;
        Ok(())
    }

    /// Stop immediately, discarding the ramp.
    pub fn hard_stop(&mut self) {
        self.state = RampState::Stop;
        self.speed = 0.0;
        self.step = 0;
    }

    /// Mark the coils as released.
    pub fn release(&mut self) {
        self.hard_stop();
        self.state = RampState::Idle;
    }

    /// Rescale for a microstep change by `factor = new / old`.
    ///
    /// All quantities are expressed in (micro)steps, so rates, speeds and the
    /// curve position grow by `factor` while intervals shrink by it. The
    /// angular speed of the shaft is unchanged.
    pub fn rescale(&mut self, factor: f64) {
        if !is_positive(factor) {
            return;
        }

        self.acceleration *= factor;
        self.deceleration *= factor;
        self.c_0 = initial_interval(self.acceleration);
        self.target_speed *= factor;
        self.c_target = 1_000_000.0 / self.target_speed;
        self.speed *= factor;
        self.c_n /= factor;
        self.step = rescale_step(self.step, factor);
        self.decel_steps = (self.speed * self.speed / (2.0 * self.deceleration)) as i64;
    }
}

fn initial_interval(acceleration: f64) -> f64 {
    C0_FACTOR * sqrt(2.0 / acceleration) * 1_000_000.0
}

fn is_positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}

/// Scale a curve position, never collapsing a moving ramp onto zero.
fn rescale_step(step: i64, factor: f64) -> i64 {
    let scaled = round(step as f64 * factor) as i64;
    if scaled == 0 && step != 0 {
        step.signum()
    } else {
        scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Drive a ramp from `start` to `target`, returning the end position and
    /// the peak speed.
    fn drive(ramp: &mut Ramp, start: i64, target: i64, limit: usize) -> (i64, f64, usize) {
        let mut position = start;
        let mut peak: f64 = 0.0;
        let mut steps = 0;

        ramp.set_direction(Direction::from_steps(target - start));
        while ramp.next_delay(Remaining::Finite(target - position)).is_some() {
            position += ramp.direction().map_or(0, Direction::sign);
            peak = peak.max(ramp.speed());
            steps += 1;
            assert!(steps <= limit, "ramp did not converge");
        }

        (position, peak, steps)
    }

    #[test]
    fn test_initial_interval() {
        let ramp = Ramp::new(1000.0, 1000.0).unwrap();
        // 0.676 * sqrt(2/1000) * 1e6
        assert!((ramp.initial_interval() - 30_231.639).abs() < 0.01);
        assert_eq!(ramp.state(), RampState::Idle);
        assert_eq!(ramp.target_speed(), DEFAULT_TARGET_SPEED);
    }

    #[test]
    fn test_first_delays_follow_recurrence() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();
        ramp.set_direction(Direction::Clockwise);

        assert_eq!(ramp.next_delay(Remaining::Finite(10)), Some(30_232));
        assert_eq!(ramp.state(), RampState::Accel);
        assert_eq!(ramp.step(), 1);

        // c_1 = c_0 * (1 - 2/5)
        assert_eq!(ramp.next_delay(Remaining::Finite(9)), Some(18_139));
        // c_2 = c_1 * (1 - 2/9)
        assert_eq!(ramp.next_delay(Remaining::Finite(8)), Some(14_108));
    }

    #[test]
    fn test_zero_distance_completes_at_once() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();
        assert_eq!(ramp.next_delay(Remaining::Finite(0)), None);
        assert_eq!(ramp.state(), RampState::Stop);
        assert_eq!(ramp.speed(), 0.0);
    }

    #[test]
    fn test_trapezoid_reaches_cruise() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();
        ramp.set_speed(500.0).unwrap();

        let mut position = 0;
        let mut seen_run = false;
        ramp.set_direction(Direction::Clockwise);
        while ramp.next_delay(Remaining::Finite(1000 - position)).is_some() {
            position += 1;
            seen_run |= ramp.state() == RampState::Run;
            assert!(ramp.speed() <= 500.0 + 1e-9);
        }

        assert!(seen_run);
        assert_eq!(position, 1000);
        assert_eq!(ramp.state(), RampState::Stop);
        assert_eq!(ramp.step(), 0);
    }

    #[test]
    fn test_chained_moves_land_on_target() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();

        assert_eq!(drive(&mut ramp, 0, 50, 10_000).0, 50);
        assert_eq!(drive(&mut ramp, 50, 150, 10_000).0, 150);
        assert_eq!(drive(&mut ramp, 150, -50, 10_000).0, -50);
    }

    #[test]
    fn test_fast_accel_slow_decel_converges() {
        // first Austin step alone exceeds the deceleration budget here
        let mut ramp = Ramp::new(1927.0, 560.0).unwrap();
        ramp.set_speed(1629.0).unwrap();

        assert_eq!(drive(&mut ramp, 0, -2881, 100_000).0, -2881);
    }

    #[test]
    fn test_reversal_runs_through_decel() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();
        ramp.set_speed(400.0).unwrap();
        ramp.set_direction(Direction::Clockwise);

        let mut position = 0;
        for _ in 0..500 {
            ramp.next_delay(Remaining::Finite(10_000 - position));
            position += 1;
        }
        assert_eq!(ramp.state(), RampState::Run);

        // target now lies behind the motor
        let mut target_reached = false;
        let mut flipped = false;
        for _ in 0..10_000 {
            let before = ramp.direction();
            match ramp.next_delay(Remaining::Finite(-position)) {
                None => {
                    target_reached = true;
                    break;
                }
                Some(_) => {
                    if ramp.direction() != before {
                        flipped = true;
                        assert_eq!(ramp.state(), RampState::Accel);
                        assert_eq!(ramp.step(), 1);
                        assert_eq!(ramp.decel_steps(), 0);
                    } else if !flipped {
                        assert_eq!(ramp.state(), RampState::Decel);
                    }
                    position += ramp.direction().map_or(0, Direction::sign);
                }
            }
        }

        assert!(flipped);
        assert!(target_reached);
        assert_eq!(position, 0);
    }

    #[test]
    fn test_continuous_never_completes() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();
        ramp.set_speed(400.0).unwrap();
        ramp.set_direction(Direction::CounterClockwise);

        for _ in 0..2000 {
            assert!(ramp
                .next_delay(Remaining::Unbounded(Direction::CounterClockwise))
                .is_some());
        }
        assert_eq!(ramp.state(), RampState::Run);
        assert!((ramp.speed() - 400.0).abs() < 1e-9);
        assert_eq!(ramp.decel_steps(), 80);
    }

    #[test]
    fn test_set_speed_while_running() {
        let mut ramp = Ramp::new(2000.0, 3000.0).unwrap();
        ramp.set_direction(Direction::Clockwise);
        for _ in 0..200 {
            ramp.next_delay(Remaining::Unbounded(Direction::Clockwise));
        }
        assert_eq!(ramp.state(), RampState::Run);

        ramp.set_speed(200.0).unwrap();
        assert_eq!(ramp.state(), RampState::Inc);
        assert_eq!(ramp.step(), 10); // 200² / (2·2000)

        for _ in 0..200 {
            ramp.next_delay(Remaining::Unbounded(Direction::Clockwise));
        }
        assert_eq!(ramp.state(), RampState::Run);

        ramp.set_speed(150.0).unwrap();
        assert_eq!(ramp.state(), RampState::Dec);
        assert_eq!(ramp.step(), -3); // -(150² / (2·3000))

        for _ in 0..200 {
            ramp.next_delay(Remaining::Unbounded(Direction::Clockwise));
        }
        assert_eq!(ramp.state(), RampState::Run);
        assert!((ramp.speed() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_speed_at_rest_only_changes_target() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();
        ramp.set_speed(250.0).unwrap();

        assert_eq!(ramp.state(), RampState::Idle);
        assert_eq!(ramp.step(), 0);
        assert_eq!(ramp.target_speed(), 250.0);
    }

    #[test]
    fn test_invalid_values_have_no_side_effects() {
        let mut ramp = Ramp::new(1000.0, 2000.0).unwrap();

        assert_eq!(
            ramp.set_speed(0.0),
            Err(ArgumentError::InvalidSpeed(0.0))
        );
        assert!(ramp.set_speed(f64::NAN).is_err());
        assert_eq!(
            ramp.set_acceleration(-1.0),
            Err(ArgumentError::InvalidAcceleration(-1.0))
        );
        assert_eq!(
            ramp.set_deceleration(0.0),
            Err(ArgumentError::InvalidDeceleration(0.0))
        );

        assert_eq!(ramp.target_speed(), DEFAULT_TARGET_SPEED);
        assert_eq!(ramp.acceleration(), 1000.0);
        assert_eq!(ramp.deceleration(), 2000.0);
        assert!(Ramp::new(0.0, 1.0).is_err());
    }

    #[test]
    fn test_set_acceleration_rescales_step() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();
        ramp.set_speed(1000.0).unwrap();
        ramp.set_direction(Direction::Clockwise);
        for _ in 0..10 {
            ramp.next_delay(Remaining::Unbounded(Direction::Clockwise));
        }
        assert_eq!(ramp.state(), RampState::Accel);
        assert_eq!(ramp.step(), 10);

        ramp.set_acceleration(2000.0).unwrap();
        assert_eq!(ramp.step(), 5);
        assert!((ramp.initial_interval() - 21_376.997).abs() < 0.01);
    }

    #[test]
    fn test_hard_stop_and_release() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();
        ramp.set_direction(Direction::Clockwise);
        for _ in 0..10 {
            ramp.next_delay(Remaining::Finite(100));
        }

        ramp.hard_stop();
        assert_eq!(ramp.state(), RampState::Stop);
        assert_eq!(ramp.speed(), 0.0);
        assert_eq!(ramp.step(), 0);

        ramp.release();
        assert_eq!(ramp.state(), RampState::Idle);
    }

    #[test]
    fn test_rescale_preserves_angular_speed() {
        let mut ramp = Ramp::new(1000.0, 1000.0).unwrap();
        ramp.set_speed(200.0).unwrap();
        ramp.set_direction(Direction::Clockwise);
        for _ in 0..100 {
            ramp.next_delay(Remaining::Unbounded(Direction::Clockwise));
        }
        let interval = ramp.interval();

        ramp.rescale(2.0);

        assert_eq!(ramp.target_speed(), 400.0);
        assert!((ramp.speed() - 400.0).abs() < 1e-9);
        assert_eq!(ramp.acceleration(), 2000.0);
        assert_eq!(ramp.deceleration(), 2000.0);
        assert!((ramp.interval() - interval / 2.0).abs() < 1e-9);

        // the ramp keeps running at the rescaled target
        ramp.next_delay(Remaining::Unbounded(Direction::Clockwise));
        assert_eq!(ramp.state(), RampState::Run);
    }

    #[test]
    fn test_remaining_helpers() {
        assert!(Remaining::Finite(0).is_zero());
        assert!(!Remaining::Unbounded(Direction::Clockwise).is_zero());
        assert_eq!(Remaining::Finite(-3).direction(), Some(Direction::CounterClockwise));
        assert_eq!(Remaining::Finite(0).direction(), None);
        assert!(Remaining::Finite(-3).within(3));
        assert!(!Remaining::Finite(4).within(3));
        assert!(!Remaining::Unbounded(Direction::Clockwise).within(i64::MAX));
    }

    proptest! {
        #[test]
        fn prop_finite_moves_end_on_target(
            acceleration in 100.0f64..5000.0,
            decel_ratio in 0.5f64..4.0,
            speed in 100.0f64..3000.0,
            target in -5000i64..5000,
        ) {
            let mut ramp = Ramp::new(acceleration, acceleration * decel_ratio).unwrap();
            ramp.set_speed(speed).unwrap();

            let limit = target.unsigned_abs() as usize + 64;
            let (position, peak, _) = drive(&mut ramp, 0, target, limit);

            prop_assert_eq!(position, target);
            prop_assert!(peak <= speed * (1.0 + 1e-9));
            prop_assert_eq!(ramp.state(), RampState::Stop);
            prop_assert_eq!(ramp.speed(), 0.0);
        }

        #[test]
        fn prop_speed_matches_interval(
            acceleration in 100.0f64..5000.0,
            steps in 1usize..500,
        ) {
            let mut ramp = Ramp::new(acceleration, acceleration).unwrap();
            ramp.set_direction(Direction::Clockwise);
            for _ in 0..steps {
                ramp.next_delay(Remaining::Unbounded(Direction::Clockwise));
                prop_assert!(ramp.interval() > 0.0);
                prop_assert!((ramp.speed() - 1_000_000.0 / ramp.interval()).abs() < 1e-6);
            }
        }
    }
}
