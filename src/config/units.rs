//! Units used by moves and driver settings.
//!
//! Degree moves arrive as [`Degrees`] and become [`Steps`] once the engine
//! knows the active microstep setting; [`Microsteps`] only admits the powers
//! of two drivers can be switched to.

use serde::Deserialize;

use crate::error::ConfigError;

/// A shaft angle or rotation in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Degrees(pub f64);

impl Degrees {
    /// Wrap an angle.
    #[inline]
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    /// The angle in degrees.
    #[inline]
    pub const fn value(self) -> f64 {
        self.0
    }
}

/// A distance or position in (micro)steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Steps(pub i64);

impl Steps {
    /// The number of steps.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Nearest whole step to an angle.
    #[inline]
    pub fn from_degrees(degrees: Degrees, steps_per_degree: f64) -> Self {
        Self(libm::round(degrees.0 * steps_per_degree) as i64)
    }
}

/// Steps a driver divides one full step into.
///
/// Always a power of two from 1 to 256. Which of these a driver can actually
/// switch to is listed in its
/// [`DriverParameters`](crate::config::DriverParameters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Microsteps(u16);

impl Microsteps {
    /// Full steps.
    pub const FULL: Self = Self(1);
    /// Half steps.
    pub const HALF: Self = Self(2);
    /// Quarter steps.
    pub const QUARTER: Self = Self(4);
    /// Eighth steps.
    pub const EIGHTH: Self = Self(8);
    /// Sixteenth steps.
    pub const SIXTEENTH: Self = Self(16);

    const MAX: u16 = 256;

    /// Validate a divisor.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidMicrosteps` unless `value` is a power of
    /// two no larger than 256.
    pub fn new(value: u16) -> Result<Self, ConfigError> {
        if value.is_power_of_two() && value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidMicrosteps(value))
        }
    }

    /// The divisor.
    #[inline]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Factor positions and rates scale by when switching to `new`.
    #[inline]
    pub fn ratio_to(self, new: Microsteps) -> f64 {
        f64::from(new.0) / f64::from(self.0)
    }
}

impl<'de> Deserialize<'de> for Microsteps {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use core::fmt::Write;
        let value = u16::deserialize(deserializer)?;
        Microsteps::new(value).map_err(|e| {
            let mut buf = heapless::String::<128>::new();
            let _ = write!(buf, "{}", e);
            serde::de::Error::custom(buf.as_str())
        })
    }
}
