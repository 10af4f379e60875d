//! Configuration module for stepper-engine.
//!
//! Provides driver parameter sets, engine timing and their loading from TOML
//! files (with `std` feature) or pre-parsed data.

mod engine;
mod params;
mod system;
pub mod units;
#[cfg(feature = "std")]
mod loader;
mod validation;

pub use engine::EngineConfig;
pub use params::{DriverParameters, ParameterOverrides, MAX_MICROSTEP_OPTIONS};
pub use system::StepperConfig;
pub use validation::{validate_config, validate_parameters};

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};

// Re-export unit types at config level
pub use units::{Degrees, Microsteps, Steps};
