//! Builder pattern for Stepper.

use std::thread;

use log::info;

use crate::config::{
    validate_config, validate_parameters, EngineConfig, Microsteps, StepperConfig,
    MAX_MICROSTEP_OPTIONS,
};
use crate::driver::Driver;
use crate::engine::{self, Engine};
use crate::error::{ConfigError, Error, LinkError, Result};
use crate::waveform::WaveformBackend;

use super::handle::Stepper;

/// Builder for creating Stepper instances.
///
/// The driver supplies default parameters; a [`StepperConfig`] (usually
/// loaded from TOML) and the individual setters below override them.
pub struct StepperBuilder<D, W>
where
    D: Driver + 'static,
    W: WaveformBackend + 'static,
{
    driver: Option<D>,
    backend: Option<W>,
    config: StepperConfig,
}

impl<D, W> Default for StepperBuilder<D, W>
where
    D: Driver + 'static,
    W: WaveformBackend + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<D, W> StepperBuilder<D, W>
where
    D: Driver + 'static,
    W: WaveformBackend + 'static,
{
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            driver: None,
            backend: None,
            config: StepperConfig::default(),
        }
    }

    /// Set the motor driver.
    pub fn driver(mut self, driver: D) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the waveform backend.
    pub fn backend(mut self, backend: W) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use a complete configuration, replacing earlier settings.
    pub fn config(mut self, config: StepperConfig) -> Self {
        self.config = config;
        self
    }

    /// Set engine timing.
    pub fn engine_config(mut self, engine: EngineConfig) -> Self {
        self.config.engine = engine;
        self
    }

    /// Override the maximum speed in steps per second.
    pub fn max_speed(mut self, speed: f64) -> Self {
        self.config.parameters.max_speed = Some(speed);
        self
    }

    /// Override the acceleration rate in steps/s².
    pub fn acceleration(mut self, rate: f64) -> Self {
        self.config.parameters.acceleration = Some(rate);
        self
    }

    /// Override the deceleration rate in steps/s².
    pub fn deceleration(mut self, rate: f64) -> Self {
        self.config.parameters.deceleration = Some(rate);
        self
    }

    /// Override full steps per revolution.
    pub fn full_steps_per_rev(mut self, steps: u32) -> Self {
        self.config.parameters.full_steps_per_rev = Some(steps);
        self
    }

    /// Override the microstep options and the setting used at start-up.
    pub fn microsteps(mut self, options: &[Microsteps], default: Microsteps) -> Self {
        self.config.parameters.microstep_options = Some(
            options
                .iter()
                .copied()
                .take(MAX_MICROSTEP_OPTIONS)
                .collect(),
        );
        self.config.parameters.microstep_default = Some(default);
        self
    }

    /// Start the engine thread and return its handle.
    ///
    /// Returns once the engine has answered its first command.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver or backend is missing, the merged
    /// parameters are invalid, or the engine does not come up.
    pub fn build(self) -> Result<Stepper> {
        let driver = self
            .driver
            .ok_or(Error::Config(ConfigError::MissingField("driver")))?;
        let backend = self
            .backend
            .ok_or(Error::Config(ConfigError::MissingField("backend")))?;

        validate_config(&self.config)?;
        let parameters = self.config.parameters_for(driver.parameters());
        validate_parameters(&parameters)?;

        let engine_config = self.config.engine;
        let (control, engine_link) = engine::link();
        let engine = Engine::new(driver, backend, &parameters, engine_config, engine_link)?;

        let thread = thread::Builder::new()
            .name("stepper-engine".into())
            .spawn(move || engine.run())
            .map_err(|_| Error::Link(LinkError::Disconnected))?;

        info!("stepper '{}' started", parameters.name);
        let stepper = Stepper::start(control, thread, parameters, engine_config);

        // the engine is ready once it answers
        stepper.ping()?;
        stepper.wait_for_idle();
        Ok(stepper)
    }
}
