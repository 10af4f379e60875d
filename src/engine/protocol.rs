//! Messages exchanged between the control handle and the engine thread.
//!
//! Every [`Command`] is answered by exactly one [`Reply`], in arrival order.
//! Both travel with a [`Tag`] chosen by the control side, so a reply that
//! arrives after its request gave up can be told apart from the next one.

use core::fmt::{self, Write};

use crate::config::{Degrees, Microsteps};
use crate::error::LinkError;
use crate::motion::{Direction, Target};

/// Sequence number pairing a reply with the command it answers.
pub type Tag = u64;

/// Command verbs, used to match acknowledgments to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Target speed changed.
    SetSpeed,
    /// Acceleration changed.
    SetAcceleration,
    /// Deceleration changed.
    SetDeceleration,
    /// Full steps per revolution changed.
    SetFullStepsPerRev,
    /// Microstep change requested.
    SetMicrosteps,
    /// Relative move.
    Move,
    /// Relative move in degrees.
    MoveDeg,
    /// Absolute move.
    MoveTo,
    /// Absolute move in degrees.
    MoveToDeg,
    /// Continuous run.
    Run,
    /// Decelerating stop.
    Stop,
    /// Immediate stop.
    HardStop,
    /// Origin reset.
    Zero,
    /// Coils energized.
    Engage,
    /// Coils released.
    Release,
    /// Value query.
    Get,
    /// No operation.
    Nop,
    /// Engine shutdown.
    Quit,
}

/// Values that can be read from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Achieved speed in steps/s.
    CurrentSpeed,
    /// Requested speed in steps/s.
    TargetSpeed,
    /// Position in (micro)steps.
    CurrentPosition,
    /// Position or direction the motor is heading for.
    TargetPosition,
    /// Acceleration in steps/s².
    Acceleration,
    /// Deceleration in steps/s².
    Deceleration,
    /// Full steps per revolution.
    FullStepsPerRev,
    /// Active microstep setting.
    Microsteps,
}

/// A request for the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Target speed in steps per second.
    SetSpeed(f64),
    /// Acceleration in steps/s².
    SetAcceleration(f64),
    /// Deceleration in steps/s².
    SetDeceleration(f64),
    /// Full steps per revolution of the motor.
    SetFullStepsPerRev(u32),
    /// Switch microsteps, synchronized with the driver.
    SetMicrosteps(Microsteps),
    /// Relative move in (micro)steps.
    Move(i64),
    /// Relative move in degrees.
    MoveDeg(Degrees),
    /// Absolute move in (micro)steps.
    MoveTo(i64),
    /// Absolute move to a shaft angle.
    MoveToDeg(Degrees),
    /// Continuous run.
    Run(Direction),
    /// Decelerate to a stop.
    Stop,
    /// Stop without deceleration.
    HardStop,
    /// Make the current position the origin.
    Zero,
    /// Energize the coils.
    Engage,
    /// De-energize the coils, stopping any move.
    Release,
    /// Read a value.
    Get(Query),
    /// Do nothing; used to synchronize with the engine.
    Nop,
    /// Stop the engine thread.
    Quit,
}

impl Command {
    /// The verb acknowledged for this command.
    pub fn verb(&self) -> Verb {
        match self {
            Command::SetSpeed(_) => Verb::SetSpeed,
            Command::SetAcceleration(_) => Verb::SetAcceleration,
            Command::SetDeceleration(_) => Verb::SetDeceleration,
            Command::SetFullStepsPerRev(_) => Verb::SetFullStepsPerRev,
            Command::SetMicrosteps(_) => Verb::SetMicrosteps,
            Command::Move(_) => Verb::Move,
            Command::MoveDeg(_) => Verb::MoveDeg,
            Command::MoveTo(_) => Verb::MoveTo,
            Command::MoveToDeg(_) => Verb::MoveToDeg,
            Command::Run(_) => Verb::Run,
            Command::Stop => Verb::Stop,
            Command::HardStop => Verb::HardStop,
            Command::Zero => Verb::Zero,
            Command::Engage => Verb::Engage,
            Command::Release => Verb::Release,
            Command::Get(_) => Verb::Get,
            Command::Nop => Verb::Nop,
            Command::Quit => Verb::Quit,
        }
    }
}

/// A value read from the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Achieved speed.
    CurrentSpeed(f64),
    /// Requested speed.
    TargetSpeed(f64),
    /// Current position.
    CurrentPosition(i64),
    /// Current target.
    TargetPosition(Target),
    /// Acceleration rate.
    Acceleration(f64),
    /// Deceleration rate.
    Deceleration(f64),
    /// Full steps per revolution.
    FullStepsPerRev(u32),
    /// Active microsteps.
    Microsteps(Microsteps),
}

impl Reading {
    /// The query this reading answers.
    pub fn query(&self) -> Query {
        match self {
            Reading::CurrentSpeed(_) => Query::CurrentSpeed,
            Reading::TargetSpeed(_) => Query::TargetSpeed,
            Reading::CurrentPosition(_) => Query::CurrentPosition,
            Reading::TargetPosition(_) => Query::TargetPosition,
            Reading::Acceleration(_) => Query::Acceleration,
            Reading::Deceleration(_) => Query::Deceleration,
            Reading::FullStepsPerRev(_) => Query::FullStepsPerRev,
            Reading::Microsteps(_) => Query::Microsteps,
        }
    }
}

/// Outcome of a microstep change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MicrostepChange {
    /// The driver cannot switch to the requested setting.
    NotPossible,
    /// The change takes effect at this position. A change made at once
    /// reports the current position already rescaled to the new setting.
    ChangeAt(i64),
}

/// The engine's answer to a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    /// The command was carried out.
    Ack(Verb),
    /// Answer to [`Command::Get`].
    Value(Reading),
    /// Answer to [`Command::SetMicrosteps`].
    Microsteps(MicrostepChange),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ack(verb) => write!(f, "ack {:?}", verb),
            Reply::Value(reading) => write!(f, "value {:?}", reading),
            Reply::Microsteps(change) => write!(f, "microsteps {:?}", change),
        }
    }
}

/// Build a protocol error for an unexpected reply.
pub(crate) fn mismatch(expected: impl fmt::Debug, received: &Reply) -> LinkError {
    let mut expected_text = heapless::String::new();
    let mut received_text = heapless::String::new();
    // overflow only truncates the message
    let _ = write!(expected_text, "{:?}", expected);
    let _ = write!(received_text, "{}", received);
    LinkError::Protocol {
        expected: expected_text,
        received: received_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_verbs() {
        assert_eq!(Command::Move(10).verb(), Verb::Move);
        assert_eq!(Command::Get(Query::Acceleration).verb(), Verb::Get);
        assert_eq!(Command::Run(Direction::Clockwise).verb(), Verb::Run);
    }

    #[test]
    fn test_reading_query() {
        assert_eq!(Reading::CurrentPosition(5).query(), Query::CurrentPosition);
        assert_eq!(
            Reading::Microsteps(Microsteps::HALF).query(),
            Query::Microsteps
        );
    }

    #[test]
    fn test_mismatch_message() {
        let err = mismatch(Verb::Move, &Reply::Ack(Verb::Stop));
        match err {
            LinkError::Protocol { expected, received } => {
                assert_eq!(expected.as_str(), "Move");
                assert_eq!(received.as_str(), "ack Stop");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
