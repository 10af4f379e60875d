//! Command handling and the idle loop of the engine thread.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::{DriverParameters, EngineConfig, Microsteps};
use crate::driver::{Driver, MicrostepReadiness};
use crate::error::Result;
use crate::motion::{Direction, PositionModel, Ramp};
use crate::waveform::WaveformBackend;

use super::busy::BusySignal;
use super::protocol::{Command, MicrostepChange, Query, Reading, Reply, Tag};
use super::EngineLink;

/// Motion engine, run on its own thread.
pub struct Engine<D, W>
where
    D: Driver,
    W: WaveformBackend,
{
    pub(super) driver: D,
    pub(super) backend: W,
    pub(super) config: EngineConfig,
    pub(super) ramp: Ramp,
    pub(super) position: PositionModel,
    commands: Receiver<(Tag, Command)>,
    replies: Sender<(Tag, Reply)>,
    busy: Arc<BusySignal>,
    pub(super) quit: bool,
}

impl<D, W> Engine<D, W>
where
    D: Driver,
    W: WaveformBackend,
{
    /// Create an engine from validated parameters, initializing the driver.
    pub(crate) fn new(
        mut driver: D,
        backend: W,
        parameters: &DriverParameters,
        config: EngineConfig,
        link: EngineLink,
    ) -> Result<Self> {
        let ramp = Ramp::new(parameters.acceleration, parameters.deceleration)?;
        let position =
            PositionModel::new(parameters.microstep_default, parameters.full_steps_per_rev);

        driver.init()?;
        if driver.microsteps() != parameters.microstep_default
            && !driver.apply_microsteps(parameters.microstep_default)
        {
            warn!(
                "driver '{}' refused default microsteps {}",
                parameters.name,
                parameters.microstep_default.value()
            );
        }

        Ok(Self {
            driver,
            backend,
            config,
            ramp,
            position,
            commands: link.commands,
            replies: link.replies,
            busy: link.busy,
            quit: false,
        })
    }

    /// The driver, for inspection.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The waveform backend, for inspection.
    pub fn backend(&self) -> &W {
        &self.backend
    }

    /// Serve commands until told to quit or the control side goes away.
    pub fn run(mut self) {
        info!("stepper engine started");

        while !self.quit {
            match self.commands.recv_timeout(self.config.idle_poll()) {
                Ok((tag, command)) => {
                    let busy = Arc::clone(&self.busy);
                    let _guard = busy.hold();
                    self.handle(tag, command);
                    while !self.quit && self.position.take_move_required() {
                        self.run_move();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("control side gone");
                    break;
                }
            }
        }

        if let Err(e) = self.driver.hard_stop() {
            warn!("driver stop on shutdown failed: {}", e);
        }
        info!("stepper engine stopped");
    }

    /// Apply every command already waiting, without blocking.
    pub(super) fn poll_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok((tag, command)) => self.handle(tag, command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.quit = true;
                    break;
                }
            }
        }
    }

    /// Apply one command and send its reply under the same tag.
    pub(super) fn handle(&mut self, tag: Tag, command: Command) {
        debug!("command {} {:?}", tag, command);
        let reply = self.apply(command);
        if self.replies.send((tag, reply)).is_err() {
            // nobody left to listen
            self.quit = true;
        }
    }

    fn apply(&mut self, command: Command) -> Reply {
        match command {
            Command::SetSpeed(speed) => {
                if let Err(e) = self.ramp.set_speed(speed) {
                    warn!("{}", e);
                }
            }
            Command::SetAcceleration(rate) => {
                if let Err(e) = self.ramp.set_acceleration(rate) {
                    warn!("{}", e);
                }
            }
            Command::SetDeceleration(rate) => {
                if let Err(e) = self.ramp.set_deceleration(rate) {
                    warn!("{}", e);
                }
            }
            Command::SetFullStepsPerRev(steps) => {
                if steps > 0 {
                    self.position.set_full_steps_per_rev(steps);
                } else {
                    warn!("ignoring zero full steps per revolution");
                }
            }
            Command::SetMicrosteps(value) => {
                return Reply::Microsteps(self.request_microsteps(value));
            }
            Command::Move(steps) => self.position.move_by(steps),
            Command::MoveDeg(angle) => self.position.move_by_deg(angle),
            Command::MoveTo(position) => self.position.move_to(position),
            Command::MoveToDeg(angle) => self.position.move_to_deg(angle),
            Command::Run(direction) => self.position.run(direction),
            Command::Stop => {
                if self.ramp.state().is_moving() {
                    // the step already scheduled still happens
                    let steps = self.ramp.decel_steps().max(1);
                    self.position.stop(steps, self.ramp.direction());
                } else {
                    self.position.stop(0, None);
                }
            }
            Command::HardStop => self.hard_stop(),
            Command::Zero => self.position.zero(),
            Command::Engage => {
                if let Err(e) = self.driver.engage() {
                    error!("engage failed: {}", e);
                }
            }
            Command::Release => {
                if let Err(e) = self.driver.release() {
                    error!("release failed: {}", e);
                }
                self.hard_stop();
                self.ramp.release();
            }
            Command::Get(query) => return Reply::Value(self.read(query)),
            Command::Nop => {}
            Command::Quit => self.quit = true,
        }

        Reply::Ack(command.verb())
    }

    fn read(&self, query: Query) -> Reading {
        match query {
            Query::CurrentSpeed => Reading::CurrentSpeed(self.ramp.speed()),
            Query::TargetSpeed => Reading::TargetSpeed(self.ramp.target_speed()),
            Query::CurrentPosition => Reading::CurrentPosition(self.position.current()),
            Query::TargetPosition => Reading::TargetPosition(self.position.target()),
            Query::Acceleration => Reading::Acceleration(self.ramp.acceleration()),
            Query::Deceleration => Reading::Deceleration(self.ramp.deceleration()),
            Query::FullStepsPerRev => {
                Reading::FullStepsPerRev(self.position.full_steps_per_rev())
            }
            Query::Microsteps => Reading::Microsteps(self.position.microsteps()),
        }
    }

    /// Stop without deceleration, forgetting the target.
    pub(super) fn hard_stop(&mut self) {
        if let Err(e) = self.driver.hard_stop() {
            error!("driver hard stop failed: {}", e);
        }
        self.ramp.hard_stop();
        self.position.collapse();
    }

    fn request_microsteps(&mut self, value: Microsteps) -> MicrostepChange {
        match self.driver.steps_until_change_microsteps(value) {
            MicrostepReadiness::Unsupported => MicrostepChange::NotPossible,
            MicrostepReadiness::Now => {
                if self.change_microsteps(value) {
                    MicrostepChange::ChangeAt(self.position.current())
                } else {
                    MicrostepChange::NotPossible
                }
            }
            MicrostepReadiness::AfterSteps(steps) => {
                let sign = self.ramp.direction().map_or(1, Direction::sign);
                let at = self.position.current() + i64::from(steps) * sign;
                self.position.schedule_microsteps(at, value);
                debug!("microstep change to {} scheduled at {}", value.value(), at);
                MicrostepChange::ChangeAt(at)
            }
        }
    }

    /// Switch driver and model to new microsteps, rescaling the ramp.
    pub(super) fn change_microsteps(&mut self, value: Microsteps) -> bool {
        let previous = self.position.microsteps();
        if !self.driver.apply_microsteps(value) {
            warn!("driver refused microsteps {}", value.value());
            return false;
        }

        let factor = self.position.apply_microsteps(value);
        self.ramp.rescale(factor);
        info!(
            "microsteps {} -> {} at {}",
            previous.value(),
            value.value(),
            self.position.current()
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DebugDriver;
    use crate::engine::{link, ControlLink, Verb};
    use crate::motion::{RampState, Target};
    use crate::waveform::SimulatedWaveform;

    fn engine_with(
        parameters: DriverParameters,
    ) -> (Engine<DebugDriver, SimulatedWaveform>, ControlLink) {
        let (control, engine_link) = link();
        let engine = Engine::new(
            DebugDriver::with_parameters(parameters.clone()),
            SimulatedWaveform::instant(),
            &parameters,
            EngineConfig::default(),
            engine_link,
        )
        .unwrap();
        (engine, control)
    }

    fn engine() -> (Engine<DebugDriver, SimulatedWaveform>, ControlLink) {
        engine_with(DriverParameters::default())
    }

    fn exchange(
        engine: &mut Engine<DebugDriver, SimulatedWaveform>,
        control: &ControlLink,
        command: Command,
    ) -> Reply {
        engine.handle(0, command);
        while engine.position.take_move_required() {
            engine.run_move();
        }
        control.replies.try_recv().unwrap().1
    }

    #[test]
    fn test_every_command_gets_one_reply() {
        let (mut engine, control) = engine();

        assert_eq!(
            exchange(&mut engine, &control, Command::SetSpeed(250.0)),
            Reply::Ack(Verb::SetSpeed)
        );
        assert_eq!(
            exchange(&mut engine, &control, Command::Nop),
            Reply::Ack(Verb::Nop)
        );
        assert_eq!(
            exchange(&mut engine, &control, Command::Get(Query::TargetSpeed)),
            Reply::Value(Reading::TargetSpeed(250.0))
        );
        assert!(control.replies.try_recv().is_err());
    }

    #[test]
    fn test_reply_carries_command_tag() {
        let (mut engine, control) = engine();
        engine.handle(41, Command::Nop);
        engine.handle(42, Command::Get(Query::CurrentPosition));

        assert_eq!(control.replies.try_recv().unwrap(), (41, Reply::Ack(Verb::Nop)));
        assert_eq!(
            control.replies.try_recv().unwrap(),
            (42, Reply::Value(Reading::CurrentPosition(0)))
        );
    }

    #[test]
    fn test_parameters_seed_the_ramp() {
        let (mut engine, control) = engine();

        assert_eq!(
            exchange(&mut engine, &control, Command::Get(Query::Acceleration)),
            Reply::Value(Reading::Acceleration(1000.0))
        );
        assert_eq!(
            exchange(&mut engine, &control, Command::Get(Query::FullStepsPerRev)),
            Reply::Value(Reading::FullStepsPerRev(400))
        );
    }

    #[test]
    fn test_chained_moves() {
        let (mut engine, control) = engine();

        exchange(&mut engine, &control, Command::Move(50));
        assert_eq!(engine.position.current(), 50);
        exchange(&mut engine, &control, Command::Move(100));
        assert_eq!(engine.position.current(), 150);
        exchange(&mut engine, &control, Command::Move(-200));
        assert_eq!(engine.position.current(), -50);

        assert_eq!(engine.ramp.state(), RampState::Stop);
        assert_eq!(engine.ramp.speed(), 0.0);
        assert_eq!(engine.driver().steps_performed(), 350);
    }

    #[test]
    fn test_stop_at_rest_keeps_target() {
        let (mut engine, control) = engine();
        exchange(&mut engine, &control, Command::Move(20));

        exchange(&mut engine, &control, Command::Stop);
        assert_eq!(engine.position.target(), Target::Position(20));
    }

    #[test]
    fn test_zero_then_query() {
        let (mut engine, control) = engine();
        exchange(&mut engine, &control, Command::MoveTo(-30));
        exchange(&mut engine, &control, Command::Zero);

        assert_eq!(
            exchange(&mut engine, &control, Command::Get(Query::CurrentPosition)),
            Reply::Value(Reading::CurrentPosition(0))
        );
    }

    #[test]
    fn test_hard_stop_collapses_target() {
        let (mut engine, control) = engine();
        engine.position.move_to(500);
        engine.handle(3, Command::HardStop);

        assert_eq!(
            control.replies.try_recv().unwrap(),
            (3, Reply::Ack(Verb::HardStop))
        );
        assert_eq!(engine.position.target(), Target::Position(0));
        assert_eq!(engine.ramp.state(), RampState::Stop);
    }

    #[test]
    fn test_release_marks_idle() {
        let (mut engine, control) = engine();
        exchange(&mut engine, &control, Command::Engage);
        assert!(engine.driver().is_engaged());

        exchange(&mut engine, &control, Command::Release);
        assert!(!engine.driver().is_engaged());
        assert_eq!(engine.ramp.state(), RampState::Idle);
    }

    #[test]
    fn test_unsupported_microsteps() {
        let (mut engine, control) = engine();
        assert_eq!(
            exchange(&mut engine, &control, Command::SetMicrosteps(Microsteps::HALF)),
            Reply::Microsteps(MicrostepChange::NotPossible)
        );
    }

    #[test]
    fn test_immediate_microstep_change_rescales() {
        let parameters = DriverParameters::default()
            .with_microsteps(&[Microsteps::FULL, Microsteps::QUARTER], Microsteps::FULL);
        let (mut engine, control) = engine_with(parameters);

        exchange(&mut engine, &control, Command::SetSpeed(200.0));
        exchange(&mut engine, &control, Command::Move(100));

        assert_eq!(
            exchange(&mut engine, &control, Command::SetMicrosteps(Microsteps::QUARTER)),
            Reply::Microsteps(MicrostepChange::ChangeAt(400))
        );
        assert_eq!(engine.position.target(), Target::Position(400));
        assert_eq!(engine.ramp.target_speed(), 800.0);
        assert_eq!(engine.ramp.acceleration(), 4000.0);
        assert_eq!(engine.driver().microsteps(), Microsteps::QUARTER);
    }

    #[test]
    fn test_quit_sets_flag() {
        let (mut engine, control) = engine();
        assert_eq!(
            exchange(&mut engine, &control, Command::Quit),
            Reply::Ack(Verb::Quit)
        );
        assert!(engine.quit);
    }

    #[test]
    fn test_dropped_control_side_quits() {
        let (mut engine, control) = engine();
        drop(control);
        engine.handle(0, Command::Nop);
        assert!(engine.quit);
    }
}
