//! Control handle for a running engine.

use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{error, warn};

use crate::config::{Degrees, DriverParameters, EngineConfig, Microsteps};
use crate::driver::Driver;
use crate::engine::{
    mismatch, BusySignal, Command, ControlLink, MicrostepChange, Query, Reading, Reply,
};
use crate::error::{ArgumentError, Error, LinkError, Result};
use crate::motion::{Direction, Target};
use crate::waveform::WaveformBackend;

use super::builder::StepperBuilder;

/// Handle to a stepper motor driven by a background engine thread.
///
/// Every method sends one command and waits for its reply. Motion commands
/// return once the engine has accepted them; pass `block = true` to wait for
/// the motion to finish as well.
///
/// The handle is `Send + Sync`; share it behind an `Arc` to control the motor
/// from several threads. Commands from different threads are serialized.
///
/// # Example
///
/// ```rust,ignore
/// use stepper_engine::{Direction, Stepper};
/// use stepper_engine::driver::DebugDriver;
/// use stepper_engine::waveform::SimulatedWaveform;
///
/// let stepper = Stepper::builder()
///     .driver(DebugDriver::new())
///     .backend(SimulatedWaveform::new())
///     .build()?;
///
/// stepper.set_target_speed(400.0)?;
/// stepper.move_by(200, None, true)?;
/// stepper.run(Direction::CounterClockwise, None)?;
/// stepper.stop(true)?;
/// ```
#[derive(Debug)]
pub struct Stepper {
    link: Mutex<ControlLink>,
    busy: Arc<BusySignal>,
    parameters: DriverParameters,
    config: EngineConfig,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Stepper {
    /// Start building a stepper.
    pub fn builder<D, W>() -> StepperBuilder<D, W>
    where
        D: Driver + 'static,
        W: WaveformBackend + 'static,
    {
        StepperBuilder::new()
    }

    pub(super) fn start(
        link: ControlLink,
        thread: JoinHandle<()>,
        parameters: DriverParameters,
        config: EngineConfig,
    ) -> Self {
        Self {
            busy: Arc::clone(&link.busy),
            link: Mutex::new(link),
            parameters,
            config,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Parameters the engine was started with.
    pub fn parameters(&self) -> &DriverParameters {
        &self.parameters
    }

    // ----- link -----

    fn lock_link(&self) -> MutexGuard<'_, ControlLink> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(&self, command: Command, timeout: Duration, what: &'static str) -> Result<Reply> {
        let mut link = self.lock_link();
        link.last_tag = link.last_tag.wrapping_add(1);
        let tag = link.last_tag;

        link.commands
            .send((tag, command))
            .map_err(|_| LinkError::Disconnected)?;

        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match link.replies.recv_timeout(left) {
                Ok((answered, reply)) if answered == tag => return Ok(reply),
                // answer to a request that already timed out
                Ok((answered, reply)) => warn!("discarding late reply {}: {}", answered, reply),
                Err(RecvTimeoutError::Timeout) => {
                    let waited_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!("no {} for {:?} after {} ms", what, command, waited_ms);
                    return Err(LinkError::Timeout { what, waited_ms }.into());
                }
                Err(RecvTimeoutError::Disconnected) => return Err(LinkError::Disconnected.into()),
            }
        }
    }

    fn send(&self, command: Command, block: bool) -> Result<()> {
        let verb = command.verb();
        match self.request(command, self.config.ack_timeout(), "acknowledgment")? {
            Reply::Ack(acked) if acked == verb => {}
            other => return Err(mismatch(verb, &other).into()),
        }

        if block {
            self.busy.wait_idle();
        }
        Ok(())
    }

    /// Round trip through the engine without side effects.
    pub(super) fn ping(&self) -> Result<()> {
        self.send(Command::Nop, false)
    }

    fn get(&self, query: Query) -> Result<Reading> {
        match self.request(Command::Get(query), self.config.value_timeout(), "value")? {
            Reply::Value(reading) if reading.query() == query => Ok(reading),
            other => Err(mismatch(query, &other).into()),
        }
    }

    // ----- settings -----

    /// Set the speed the motor accelerates to, in steps per second.
    ///
    /// Takes effect immediately, also during a move.
    ///
    /// # Errors
    ///
    /// Rejects non-positive or non-finite speeds without contacting the engine.
    pub fn set_target_speed(&self, speed: f64) -> Result<()> {
        if !is_positive(speed) {
            return Err(ArgumentError::InvalidSpeed(speed).into());
        }
        self.send(Command::SetSpeed(speed), false)
    }

    /// Set the acceleration rate in steps/s².
    ///
    /// # Errors
    ///
    /// Rejects non-positive or non-finite rates without contacting the engine.
    pub fn set_acceleration(&self, rate: f64) -> Result<()> {
        if !is_positive(rate) {
            return Err(ArgumentError::InvalidAcceleration(rate).into());
        }
        self.send(Command::SetAcceleration(rate), false)
    }

    /// Set the deceleration rate in steps/s².
    ///
    /// # Errors
    ///
    /// Rejects non-positive or non-finite rates without contacting the engine.
    pub fn set_deceleration(&self, rate: f64) -> Result<()> {
        if !is_positive(rate) {
            return Err(ArgumentError::InvalidDeceleration(rate).into());
        }
        self.send(Command::SetDeceleration(rate), false)
    }

    /// Set the number of full steps per output revolution.
    pub fn set_full_steps_per_rev(&self, steps: u32) -> Result<()> {
        if steps == 0 {
            return Err(ArgumentError::InvalidFullStepsPerRev(steps).into());
        }
        self.send(Command::SetFullStepsPerRev(steps), false)
    }

    /// Change the microstep setting.
    ///
    /// Some drivers can only switch at particular positions; the reply says
    /// where the change takes effect. Positions, speeds and rates are all
    /// rescaled to the new setting at that point.
    ///
    /// # Errors
    ///
    /// Rejects settings the driver does not list in its parameters.
    pub fn set_microsteps(&self, value: u16) -> Result<MicrostepChange> {
        if !self.parameters.supports_microsteps(value) {
            return Err(ArgumentError::UnsupportedMicrosteps(value).into());
        }
        let microsteps =
            Microsteps::new(value).map_err(|_| ArgumentError::UnsupportedMicrosteps(value))?;

        let command = Command::SetMicrosteps(microsteps);
        match self.request(command, self.config.microstep_timeout(), "microstep reply")? {
            Reply::Microsteps(change) => Ok(change),
            other => Err(mismatch(command.verb(), &other).into()),
        }
    }

    // ----- motion -----

    /// Move by a number of (micro)steps.
    ///
    /// While a move is under way the distance is added to its target; in
    /// continuous mode it is counted from the current position. `speed`
    /// replaces the target speed first.
    ///
    /// # Errors
    ///
    /// Rejects a non-positive or non-finite speed without contacting the engine.
    pub fn move_by(&self, steps: i64, speed: Option<f64>, block: bool) -> Result<()> {
        if let Some(speed) = speed {
            self.set_target_speed(speed)?;
        }
        self.send(Command::Move(steps), block)
    }

    /// Move to an absolute position in (micro)steps.
    pub fn move_to(&self, position: i64, block: bool) -> Result<()> {
        self.send(Command::MoveTo(position), block)
    }

    /// Turn the shaft by an angle in degrees, rounded to the nearest step.
    pub fn move_by_deg(&self, angle: f64, block: bool) -> Result<()> {
        if !angle.is_finite() {
            return Err(ArgumentError::InvalidAngle(angle).into());
        }
        self.send(Command::MoveDeg(Degrees::new(angle)), block)
    }

    /// Turn the shaft to an angle within the current revolution.
    ///
    /// A positive angle is reached turning clockwise, a negative one turning
    /// counter-clockwise, so `-90.0` and `270.0` name the same shaft angle
    /// approached from opposite sides. The motor never turns a full
    /// revolution or more.
    pub fn move_to_deg(&self, angle: f64, block: bool) -> Result<()> {
        if !angle.is_finite() {
            return Err(ArgumentError::InvalidAngle(angle).into());
        }
        self.send(Command::MoveToDeg(Degrees::new(angle)), block)
    }

    /// Run continuously until stopped or given a move.
    ///
    /// `speed` replaces the target speed first. Never blocks.
    pub fn run(&self, direction: Direction, speed: Option<f64>) -> Result<()> {
        if let Some(speed) = speed {
            self.set_target_speed(speed)?;
        }
        self.send(Command::Run(direction), false)
    }

    /// Decelerate to a stop.
    pub fn stop(&self, block: bool) -> Result<()> {
        self.send(Command::Stop, block)
    }

    /// Stop at once, without deceleration.
    ///
    /// Steps already handed to the backend may still be emitted, and a
    /// fast-turning motor may lose steps to inertia; the position can be off
    /// afterwards.
    pub fn hard_stop(&self, block: bool) -> Result<()> {
        self.send(Command::HardStop, block)
    }

    /// Make the current position the origin.
    ///
    /// A move under way is not affected: it still covers its remaining
    /// distance, now counted from zero.
    pub fn zero(&self) -> Result<()> {
        self.send(Command::Zero, false)
    }

    /// Energize the motor coils. Moves do this on their own.
    pub fn engage(&self, block: bool) -> Result<()> {
        self.send(Command::Engage, block)
    }

    /// De-energize the coils, stopping any motion at once.
    pub fn release(&self, block: bool) -> Result<()> {
        self.send(Command::Release, block)
    }

    // ----- queries -----

    /// Speed actually reached, in steps per second.
    pub fn current_speed(&self) -> Result<f64> {
        match self.get(Query::CurrentSpeed)? {
            Reading::CurrentSpeed(speed) => Ok(speed),
            other => Err(unexpected(other)),
        }
    }

    /// Requested speed in steps per second.
    pub fn target_speed(&self) -> Result<f64> {
        match self.get(Query::TargetSpeed)? {
            Reading::TargetSpeed(speed) => Ok(speed),
            other => Err(unexpected(other)),
        }
    }

    /// Acceleration rate in steps/s².
    pub fn acceleration(&self) -> Result<f64> {
        match self.get(Query::Acceleration)? {
            Reading::Acceleration(rate) => Ok(rate),
            other => Err(unexpected(other)),
        }
    }

    /// Deceleration rate in steps/s².
    pub fn deceleration(&self) -> Result<f64> {
        match self.get(Query::Deceleration)? {
            Reading::Deceleration(rate) => Ok(rate),
            other => Err(unexpected(other)),
        }
    }

    /// Full steps per output revolution.
    pub fn full_steps_per_rev(&self) -> Result<u32> {
        match self.get(Query::FullStepsPerRev)? {
            Reading::FullStepsPerRev(steps) => Ok(steps),
            other => Err(unexpected(other)),
        }
    }

    /// Active microstep setting.
    pub fn microsteps(&self) -> Result<Microsteps> {
        match self.get(Query::Microsteps)? {
            Reading::Microsteps(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    /// Position in (micro)steps from the origin.
    ///
    /// While moving, the reported value may lag the shaft by a step or two.
    pub fn current_position(&self) -> Result<i64> {
        match self.get(Query::CurrentPosition)? {
            Reading::CurrentPosition(position) => Ok(position),
            other => Err(unexpected(other)),
        }
    }

    /// Where the motor is heading.
    pub fn target_position(&self) -> Result<Target> {
        match self.get(Query::TargetPosition)? {
            Reading::TargetPosition(target) => Ok(target),
            other => Err(unexpected(other)),
        }
    }

    // ----- idle state -----

    /// Whether the engine is handling a command or running a move.
    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Block until the engine is idle.
    pub fn wait_for_idle(&self) {
        self.busy.wait_idle();
    }

    /// Block until the engine is idle or `timeout` elapses.
    ///
    /// Returns `true` if the engine went idle.
    pub fn wait_for_idle_timeout(&self, timeout: Duration) -> bool {
        self.busy.wait_idle_timeout(timeout)
    }

    // ----- shutdown -----

    /// Stop the engine thread and wait for it to exit.
    ///
    /// Any move is abandoned without deceleration. Calling `close` again is a
    /// no-op. If the engine does not acknowledge in time the thread is left
    /// running and the timeout is returned.
    pub fn close(&self) -> Result<()> {
        let mut thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = thread.take() else {
            return Ok(());
        };

        match self.send(Command::Quit, false) {
            Ok(()) | Err(Error::Link(LinkError::Disconnected)) => {}
            Err(e) => return Err(e),
        }

        if handle.join().is_err() {
            error!("stepper engine thread panicked");
        }
        Ok(())
    }
}

impl Drop for Stepper {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("stepper engine did not shut down: {}", e);
        }
    }
}

fn unexpected(reading: Reading) -> Error {
    mismatch(reading.query(), &Reply::Value(reading)).into()
}

#[inline]
fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
