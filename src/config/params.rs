//! Driver and motor parameter set.

use heapless::{String, Vec};
use serde::Deserialize;

use super::units::Microsteps;

/// Maximum number of microstep options a driver can offer.
pub const MAX_MICROSTEP_OPTIONS: usize = 9;

/// Physical parameters of a driver and its motor.
///
/// Every driver supplies its own defaults. Callers may override individual
/// values with [`ParameterOverrides`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriverParameters {
    /// Human-readable driver name (max 32 chars).
    pub name: String<32>,

    /// Recommended maximum speed in steps per second. Not enforced.
    pub max_speed: f64,

    /// Highest speed at which the motor still delivers full torque.
    pub max_torque_speed: f64,

    /// Acceleration in steps per second squared.
    #[serde(rename = "acceleration_rate")]
    pub acceleration: f64,

    /// Deceleration in steps per second squared.
    #[serde(rename = "deceleration_rate")]
    pub deceleration: f64,

    /// Full (not micro-) steps per revolution.
    pub full_steps_per_rev: u32,

    /// Microstep settings the driver can switch to.
    pub microstep_options: Vec<Microsteps, MAX_MICROSTEP_OPTIONS>,

    /// Microstep setting used at start-up.
    pub microstep_default: Microsteps,
}

impl Default for DriverParameters {
    fn default() -> Self {
        let mut microstep_options = Vec::new();
        let _ = microstep_options.push(Microsteps::FULL);
        Self {
            name: String::try_from("Debug driver").unwrap_or_default(),
            max_speed: 1000.0,
            max_torque_speed: 100.0,
            acceleration: 1000.0,
            deceleration: 1000.0,
            full_steps_per_rev: 400,
            microstep_options,
            microstep_default: Microsteps::FULL,
        }
    }
}

impl DriverParameters {
    /// Replace the name, truncating to 32 characters.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name.clear();
        for c in name.chars() {
            if self.name.push(c).is_err() {
                break;
            }
        }
        self
    }

    /// Replace the microstep options and default.
    pub fn with_microsteps(mut self, options: &[Microsteps], default: Microsteps) -> Self {
        self.microstep_options = options
            .iter()
            .copied()
            .take(MAX_MICROSTEP_OPTIONS)
            .collect();
        self.microstep_default = default;
        self
    }

    /// Check whether the driver offers a microstep setting.
    #[inline]
    pub fn supports_microsteps(&self, value: u16) -> bool {
        self.microstep_options.iter().any(|m| m.value() == value)
    }

    /// Steps (or microsteps) per output revolution for a microstep setting.
    #[inline]
    pub fn steps_per_rev(&self, microsteps: Microsteps) -> u32 {
        self.full_steps_per_rev * microsteps.value() as u32
    }

    /// Return a copy with the given overrides applied.
    pub fn merge(&self, overrides: &ParameterOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(v) = overrides.max_speed {
            merged.max_speed = v;
        }
        if let Some(v) = overrides.max_torque_speed {
            merged.max_torque_speed = v;
        }
        if let Some(v) = overrides.acceleration {
            merged.acceleration = v;
        }
        if let Some(v) = overrides.deceleration {
            merged.deceleration = v;
        }
        if let Some(v) = overrides.full_steps_per_rev {
            merged.full_steps_per_rev = v;
        }
        if let Some(ref v) = overrides.microstep_options {
            merged.microstep_options = v.clone();
        }
        if let Some(v) = overrides.microstep_default {
            merged.microstep_default = v;
        }
        merged
    }
}

/// Optional replacements for a driver's default parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParameterOverrides {
    /// Replacement maximum speed.
    pub max_speed: Option<f64>,
    /// Replacement full-torque speed.
    pub max_torque_speed: Option<f64>,
    /// Replacement acceleration.
    #[serde(rename = "acceleration_rate")]
    pub acceleration: Option<f64>,
    /// Replacement deceleration.
    #[serde(rename = "deceleration_rate")]
    pub deceleration: Option<f64>,
    /// Replacement full steps per revolution.
    pub full_steps_per_rev: Option<u32>,
    /// Replacement microstep options.
    pub microstep_options: Option<Vec<Microsteps, MAX_MICROSTEP_OPTIONS>>,
    /// Replacement default microsteps.
    pub microstep_default: Option<Microsteps>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = DriverParameters::default();
        assert_eq!(p.full_steps_per_rev, 400);
        assert!(p.supports_microsteps(1));
        assert!(!p.supports_microsteps(2));
        assert_eq!(p.steps_per_rev(Microsteps::HALF), 800);
    }

    #[test]
    fn test_merge_keeps_unset_values() {
        let base = DriverParameters::default();
        let overrides = ParameterOverrides {
            acceleration: Some(2500.0),
            full_steps_per_rev: Some(200),
            ..Default::default()
        };

        let merged = base.merge(&overrides);
        assert_eq!(merged.acceleration, 2500.0);
        assert_eq!(merged.full_steps_per_rev, 200);
        assert_eq!(merged.deceleration, base.deceleration);
        assert_eq!(merged.name, base.name);
    }

    #[test]
    fn test_builder_helpers() {
        let p = DriverParameters::default()
            .with_name("Generic Unipolar")
            .with_microsteps(&[Microsteps::FULL, Microsteps::HALF], Microsteps::HALF);

        assert_eq!(p.name.as_str(), "Generic Unipolar");
        assert!(p.supports_microsteps(2));
        assert_eq!(p.microstep_default, Microsteps::HALF);

        let long = DriverParameters::default().with_name(&"x".repeat(40));
        assert_eq!(long.name.len(), 32);
    }
}
