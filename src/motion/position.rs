//! Position tracking and move targets.
//!
//! Keeps the absolute (micro)step position of the shaft, the current target
//! and a pending microstep change, and translates relative, absolute and
//! degree moves into step targets.

use libm::{round, trunc};

use crate::config::units::{Degrees, Microsteps, Steps};

use super::ramp::{Direction, Remaining};

/// Where the motor is heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Target {
    /// A fixed position in (micro)steps.
    Position(i64),
    /// Run until told otherwise.
    Continuous(Direction),
}

/// A microstep change waiting for the shaft to reach a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingMicrosteps {
    /// Position at which the change takes effect.
    pub at: i64,
    /// New microstep setting.
    pub value: Microsteps,
}

/// Motor position and target tracker.
#[derive(Debug, Clone)]
pub struct PositionModel {
    current: i64,
    target: Target,
    microsteps: Microsteps,
    full_steps_per_rev: u32,
    pending: Option<PendingMicrosteps>,
    move_required: bool,
}

impl PositionModel {
    /// Create a tracker at the origin.
    pub fn new(microsteps: Microsteps, full_steps_per_rev: u32) -> Self {
        Self {
            current: 0,
            target: Target::Position(0),
            microsteps,
            full_steps_per_rev,
            pending: None,
            move_required: false,
        }
    }

    /// Current position in (micro)steps.
    #[inline]
    pub fn current(&self) -> i64 {
        self.current
    }

    /// Current target.
    #[inline]
    pub fn target(&self) -> Target {
        self.target
    }

    /// Active microstep setting.
    #[inline]
    pub fn microsteps(&self) -> Microsteps {
        self.microsteps
    }

    /// Full steps per revolution of the motor.
    #[inline]
    pub fn full_steps_per_rev(&self) -> u32 {
        self.full_steps_per_rev
    }

    /// Change the full steps per revolution used for degree moves.
    #[inline]
    pub fn set_full_steps_per_rev(&mut self, steps: u32) {
        self.full_steps_per_rev = steps;
    }

    /// (Micro)steps per shaft revolution.
    #[inline]
    pub fn steps_per_rev(&self) -> f64 {
        self.full_steps_per_rev as f64 * self.microsteps.value() as f64
    }

    /// (Micro)steps per degree of shaft rotation.
    #[inline]
    pub fn steps_per_degree(&self) -> f64 {
        self.steps_per_rev() / 360.0
    }

    /// Whether the motor is in continuous mode.
    #[inline]
    pub fn is_continuous(&self) -> bool {
        matches!(self.target, Target::Continuous(_))
    }

    /// Distance left to the target.
    pub fn remaining(&self) -> Remaining {
        match self.target {
            Target::Position(target) => Remaining::Finite(target - self.current),
            Target::Continuous(direction) => Remaining::Unbounded(direction),
        }
    }

    /// Return and clear the "a move must be started" flag.
    #[inline]
    pub fn take_move_required(&mut self) -> bool {
        core::mem::take(&mut self.move_required)
    }

    /// Move relative to the current target.
    ///
    /// In continuous mode the move is relative to the current position and
    /// ends continuous mode.
    pub fn move_by(&mut self, steps: i64) {
        if steps == 0 {
            return;
        }

        self.target = match self.target {
            Target::Position(target) => Target::Position(target + steps),
            Target::Continuous(_) => Target::Position(self.current + steps),
        };
        self.move_required = true;
    }

    /// Move to an absolute position.
    pub fn move_to(&mut self, position: i64) {
        if self.target != Target::Position(position) {
            self.target = Target::Position(position);
            self.move_required = true;
        }
    }

    /// Move by an angle, rounded to the nearest (micro)step.
    pub fn move_by_deg(&mut self, angle: Degrees) {
        let steps = Steps::from_degrees(angle, self.steps_per_degree());
        self.move_by(steps.value());
    }

    /// Move to an absolute shaft angle.
    ///
    /// Whole revolutions in the requested angle are travelled in full. The
    /// remaining fraction is reached clockwise for positive angles and
    /// counter-clockwise for negative ones, never travelling more than one
    /// extra revolution. An angle equal to the current angle (modulo one
    /// revolution) adds no extra revolution.
    pub fn move_to_deg(&mut self, angle: Degrees) {
        let steps_per_rev = self.steps_per_rev();
        let current = self.current as f64;

        let current_full_revs = trunc(current / steps_per_rev) * steps_per_rev;
        let current_angle = current % steps_per_rev;

        let target = angle.value() * self.steps_per_degree();
        let target_full_revs = trunc(target / steps_per_rev) * steps_per_rev;
        let mut target_angle = target % steps_per_rev;

        let angle_position = if angle.value() >= 0.0 {
            if target_angle >= current_angle {
                target_angle
            } else {
                target_angle + steps_per_rev
            }
        } else {
            // work on the same side of zero as the current angle
            if current_angle > 0.0 && target_angle < 0.0 {
                target_angle += steps_per_rev;
            }
            if target_angle <= current_angle {
                target_angle
            } else {
                target_angle - steps_per_rev
            }
        };

        let position = current_full_revs + target_full_revs + angle_position;
        self.move_to(round(position) as i64);
    }

    /// Run continuously in one direction.
    pub fn run(&mut self, direction: Direction) {
        self.target = Target::Continuous(direction);
        self.move_required = true;
    }

    /// Retarget so the motor comes to rest as soon as the ramp allows.
    pub fn stop(&mut self, decel_steps: i64, direction: Option<Direction>) {
        let offset = direction.map_or(0, |d| d.sign() * decel_steps);
        self.target = Target::Position(self.current + offset);
    }

    /// Forget the target, stopping where the motor is.
    pub fn collapse(&mut self) {
        self.target = Target::Position(self.current);
    }

    /// Make the current position the origin, keeping the outstanding distance.
    pub fn zero(&mut self) {
        if let Target::Position(target) = self.target {
            self.target = Target::Position(target - self.current);
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.at -= self.current;
        }
        self.current = 0;
    }

    /// Commit one step in `direction`.
    ///
    /// Returns a pending microstep change whose threshold has just been
    /// reached; it is removed from the model.
    pub fn advance(&mut self, direction: Direction) -> Option<PendingMicrosteps> {
        self.current += direction.sign();
        match self.pending {
            Some(pending) if pending.at == self.current => self.pending.take(),
            _ => None,
        }
    }

    /// Pending microstep change, if any.
    #[inline]
    pub fn pending_microsteps(&self) -> Option<PendingMicrosteps> {
        self.pending
    }

    /// Schedule a microstep change at a position, replacing any earlier one.
    pub fn schedule_microsteps(&mut self, at: i64, value: Microsteps) {
        self.pending = Some(PendingMicrosteps { at, value });
    }

    /// Switch to a new microstep setting, scaling positions to match.
    ///
    /// Returns the scale factor `new / old`.
    pub fn apply_microsteps(&mut self, value: Microsteps) -> f64 {
        let factor = self.microsteps.ratio_to(value);
        self.microsteps = value;
        self.pending = None;
        self.current = round(self.current as f64 * factor) as i64;
        if let Target::Position(target) = self.target {
            self.target = Target::Position(round(target as f64 * factor) as i64);
        }
        factor
    }
}
