//! Root configuration structure.

use serde::Deserialize;

use super::engine::EngineConfig;
use super::params::{DriverParameters, ParameterOverrides};

/// Root configuration structure from TOML.
///
/// ```toml
/// [engine]
/// idle_poll_ms = 100
/// ack_timeout_ms = 3000
///
/// [parameters]
/// acceleration_rate = 2000.0
/// full_steps_per_rev = 200
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StepperConfig {
    /// Engine timing.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Overrides for the driver's default parameters.
    #[serde(default)]
    pub parameters: ParameterOverrides,
}

impl StepperConfig {
    /// Resolve the effective parameters for a driver.
    pub fn parameters_for(&self, defaults: &DriverParameters) -> DriverParameters {
        defaults.merge(&self.parameters)
    }
}
