//! The step loop.
//!
//! Two waveform buffers are in flight at any time: the one playing and the
//! one queued behind it. While the playing buffer runs, the engine computes
//! the next step and keeps serving commands, so a target or speed change
//! takes effect within a step or two.

use std::thread;

use log::{error, info};

use crate::driver::Driver;
use crate::error::Result;
use crate::motion::{Direction, Remaining};
use crate::waveform::{BufferId, PulsePattern, TransmitMode, WaveformBackend};

use super::controller::Engine;

impl<D, W> Engine<D, W>
where
    D: Driver,
    W: WaveformBackend,
{
    /// Run one move to its end.
    ///
    /// A backend failure aborts the move with a hard stop; the engine keeps
    /// serving commands afterwards.
    pub(super) fn run_move(&mut self) {
        if let Err(e) = self.step_until_done() {
            error!("move aborted: {}", e);
            self.hard_stop();
            self.backend.clear_all();
        }
    }

    fn step_until_done(&mut self) -> Result<()> {
        let remaining = self.position.remaining();
        if remaining.is_zero() {
            return Ok(());
        }

        let direction = match remaining {
            Remaining::Finite(delta) => Direction::from_steps(delta),
            Remaining::Unbounded(direction) => direction,
        };

        self.driver.engage()?;
        self.ramp.set_direction(direction);
        self.driver.set_direction(direction)?;

        // a short buffer so there is always one playing to queue behind
        self.backend.clear_all();
        let priming = PulsePattern::delay(self.config.priming_pulse_us);
        let mut current: BufferId = self.backend.submit(&priming)?;
        self.backend.transmit(current, TransmitMode::Immediate)?;

        info!(
            "move from {} to {:?}",
            self.position.current(),
            self.position.target()
        );

        let Some(mut delay) = self.ramp.next_delay(remaining) else {
            self.drain();
            return Ok(());
        };

        while !self.quit {
            let pattern = self.driver.perform_step(delay);
            let next = self.backend.submit(&pattern)?;
            self.backend.transmit(next, TransmitMode::QueueAfterCurrent)?;

            let stepped = self.ramp.direction().unwrap_or(direction);
            if let Some(pending) = self.position.advance(stepped) {
                self.change_microsteps(pending.value);
            }

            match self.ramp.next_delay(self.position.remaining()) {
                Some(next_delay) => delay = next_delay,
                None => {
                    self.drain();
                    info!("move done at {}", self.position.current());
                    return Ok(());
                }
            }

            if let Some(now) = self.ramp.direction() {
                if now != stepped {
                    self.driver.set_direction(now)?;
                }
            }

            // no sleep here: the next buffer must be queued before this one ends
            loop {
                self.poll_commands();
                if self.quit || self.backend.currently_transmitting() != Some(current) {
                    break;
                }
            }

            if !self.ramp.state().is_moving() {
                // hard stop or release while stepping
                self.backend.clear_all();
                info!("move stopped at {}", self.position.current());
                return Ok(());
            }

            self.backend.release(current)?;
            current = next;
        }

        self.backend.clear_all();
        Ok(())
    }

    /// Let the queued buffers play out, then free everything.
    fn drain(&mut self) {
        while self.backend.is_busy() {
            thread::sleep(self.config.drain_sleep());
        }
        self.backend.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{DriverParameters, EngineConfig};
    use crate::driver::DebugDriver;
    use crate::engine::controller::Engine;
    use crate::engine::{link, Command, ControlLink};
    use crate::motion::{Direction, RampState, Target};
    use crate::waveform::{Pulse, SimulatedWaveform, WaveformLog};

    fn engine() -> (Engine<DebugDriver, SimulatedWaveform>, ControlLink, WaveformLog) {
        let (control, engine_link) = link();
        let backend = SimulatedWaveform::instant();
        let log = backend.log();
        let engine = Engine::new(
            DebugDriver::new(),
            backend,
            &DriverParameters::default(),
            EngineConfig::default(),
            engine_link,
        )
        .unwrap();
        (engine, control, log)
    }

    #[test]
    fn test_move_transmits_priming_then_steps() {
        let (mut engine, _control, log) = engine();
        engine.position.move_to(10);
        engine.run_move();

        let transmitted = log.transmitted();
        assert_eq!(transmitted.len(), 11);
        assert_eq!(transmitted[0].pulses(), &[Pulse::delay(100)]);
        // first step waits the full initial interval
        assert_eq!(transmitted[1].pulses(), &[Pulse::delay(30_232)]);

        assert_eq!(engine.position.current(), 10);
        assert_eq!(engine.ramp.state(), RampState::Stop);
        assert_eq!(engine.backend().buffer_count(), 0);
    }

    #[test]
    fn test_buffers_are_released_as_they_finish() {
        let (mut engine, _control, log) = engine();
        engine.position.move_to(-25);
        engine.run_move();

        // the priming buffer and all steps but the last two are released one by one
        assert_eq!(log.released(), 24);
        assert!(log.clears() >= 2);
        assert_eq!(engine.driver().direction(), Direction::CounterClockwise);
    }

    #[test]
    fn test_zero_distance_sends_nothing() {
        let (mut engine, _control, log) = engine();
        engine.run_move();

        assert_eq!(log.transmit_count(), 0);
        assert!(!engine.driver().is_engaged());
    }

    #[test]
    fn test_commands_are_served_while_stepping() {
        let (mut engine, control, _log) = engine();
        engine.position.run(Direction::Clockwise);

        // queued before the move starts, picked up by the first poll
        control.commands.send((0, Command::Stop)).unwrap();
        engine.run_move();

        assert_eq!(engine.ramp.state(), RampState::Stop);
        assert_eq!(
            engine.position.target(),
            Target::Position(engine.position.current())
        );
    }

    #[test]
    fn test_hard_stop_ends_loop() {
        let (mut engine, control, log) = engine();
        engine.position.move_to(1_000);

        control.commands.send((0, Command::HardStop)).unwrap();
        engine.run_move();

        assert_eq!(engine.position.current(), 1);
        assert_eq!(engine.position.target(), Target::Position(1));
        assert_eq!(log.transmit_count(), 2);
    }

    #[test]
    fn test_backend_failure_aborts_move() {
        let (control, engine_link) = link();
        let backend = SimulatedWaveform::instant().with_max_buffers(1);
        let mut engine = Engine::new(
            DebugDriver::new(),
            backend,
            &DriverParameters::default(),
            EngineConfig::default(),
            engine_link,
        )
        .unwrap();

        engine.position.move_to(100);
        engine.run_move();

        assert_eq!(engine.ramp.state(), RampState::Stop);
        assert_eq!(engine.position.target(), Target::Position(0));
        assert!(!engine.driver().is_engaged());
        drop(control);
    }
}
