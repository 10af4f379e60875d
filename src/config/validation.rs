//! Configuration validation.

use crate::error::{ConfigError, Error, Result};

use super::{DriverParameters, EngineConfig, ParameterOverrides, StepperConfig};

/// Validate a stepper configuration.
///
/// Checks:
/// - Overridden rates and speeds are positive
/// - Overridden full steps per revolution is non-zero
/// - Overridden microstep options are non-empty
/// - Engine timeouts and intervals are non-zero
pub fn validate_config(config: &StepperConfig) -> Result<()> {
    validate_engine(&config.engine)?;
    validate_overrides(&config.parameters)?;
    Ok(())
}

/// Validate a resolved parameter set, as used to start an engine.
pub fn validate_parameters(params: &DriverParameters) -> Result<()> {
    positive("max_speed", params.max_speed)?;
    positive("max_torque_speed", params.max_torque_speed)?;
    positive("acceleration_rate", params.acceleration)?;
    positive("deceleration_rate", params.deceleration)?;

    if params.full_steps_per_rev == 0 {
        return Err(Error::Config(ConfigError::ZeroFullSteps));
    }

    if params.microstep_options.is_empty() {
        return Err(Error::Config(ConfigError::NoMicrostepOptions));
    }

    if !params.supports_microsteps(params.microstep_default.value()) {
        return Err(Error::Config(ConfigError::DefaultMicrostepsUnsupported(
            params.microstep_default.value(),
        )));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<()> {
    let checks = [
        ("idle_poll_ms", engine.idle_poll_ms),
        ("ack_timeout_ms", engine.ack_timeout_ms),
        ("value_timeout_ms", engine.value_timeout_ms),
        ("microstep_timeout_ms", engine.microstep_timeout_ms),
    ];

    for (name, value) in checks {
        if value == 0 {
            return Err(Error::Config(ConfigError::ZeroInterval(name)));
        }
    }

    if engine.priming_pulse_us == 0 {
        return Err(Error::Config(ConfigError::ZeroInterval("priming_pulse_us")));
    }

    Ok(())
}

fn validate_overrides(overrides: &ParameterOverrides) -> Result<()> {
    let rates = [
        ("max_speed", overrides.max_speed),
        ("max_torque_speed", overrides.max_torque_speed),
        ("acceleration_rate", overrides.acceleration),
        ("deceleration_rate", overrides.deceleration),
    ];

    for (name, value) in rates {
        if let Some(v) = value {
            positive(name, v)?;
        }
    }

    if overrides.full_steps_per_rev == Some(0) {
        return Err(Error::Config(ConfigError::ZeroFullSteps));
    }

    if let Some(ref options) = overrides.microstep_options {
        if options.is_empty() {
            return Err(Error::Config(ConfigError::NoMicrostepOptions));
        }
    }

    Ok(())
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::Config(ConfigError::NonPositive { field, value }))
    }
}
