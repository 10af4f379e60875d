//! Error types for stepper-engine.
//!
//! Separates caller mistakes (rejected before any message is sent) from link
//! failures between the control handle and the engine thread, so callers can
//! tell a malformed request from an unresponsive or corrupted backend.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all stepper-engine operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid argument, detected before any command was sent
    Argument(ArgumentError),
    /// Control/engine link failure
    Link(LinkError),
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Driver GPIO operation error
    Motor(MotorError),
    /// Waveform backend error
    Waveform(WaveformError),
}

/// Rejected arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentError {
    /// Target speed must be > 0
    InvalidSpeed(f64),
    /// Acceleration must be > 0
    InvalidAcceleration(f64),
    /// Deceleration must be > 0
    InvalidDeceleration(f64),
    /// Full steps per revolution must be > 0
    InvalidFullStepsPerRev(u32),
    /// Angle must be finite
    InvalidAngle(f64),
    /// Microstep value is not offered by the driver
    UnsupportedMicrosteps(u16),
}

/// Failures on the channel between control handle and engine.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// No reply within the allowed time. Usually means the engine thread died.
    Timeout {
        /// What we were waiting for
        what: &'static str,
        /// How long we waited in milliseconds
        waited_ms: u64,
    },
    /// The engine thread is gone
    Disconnected,
    /// A reply did not match the request
    Protocol {
        /// Expected reply
        expected: heapless::String<32>,
        /// Reply actually received
        received: heapless::String<64>,
    },
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Invalid microstep value (must be power of 2: 1, 2, 4, 8, 16, 32, 64, 128, 256)
    InvalidMicrosteps(u16),
    /// Default microsteps not among the supported options
    DefaultMicrostepsUnsupported(u16),
    /// Microstep option list is empty
    NoMicrostepOptions,
    /// A rate or speed parameter is not positive
    NonPositive {
        /// Parameter name
        field: &'static str,
        /// Offending value
        value: f64,
    },
    /// Full steps per revolution is zero
    ZeroFullSteps,
    /// A timeout or interval is zero
    ZeroInterval(&'static str),
    /// A required builder input was not provided
    MissingField(&'static str),
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Driver GPIO errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotorError {
    /// Pin operation failed
    PinError,
    /// GPIO line number beyond what a pulse mask can address
    LineOutOfRange(u8),
}

/// Waveform backend errors.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveformError {
    /// No free buffer slot
    OutOfBuffers,
    /// Pattern has no pulses
    EmptyPattern,
    /// Buffer id is not known to the backend
    UnknownBuffer(u32),
    /// Backend refused to transmit
    TransmitFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Argument(e) => write!(f, "Invalid argument: {}", e),
            Error::Link(e) => write!(f, "Engine link error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Motor(e) => write!(f, "Motor error: {}", e),
            Error::Waveform(e) => write!(f, "Waveform error: {}", e),
        }
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentError::InvalidSpeed(v) => write!(f, "Speed must be > 0.0, was {}", v),
            ArgumentError::InvalidAcceleration(v) => {
                write!(f, "Acceleration must be greater than 0.0, was {}", v)
            }
            ArgumentError::InvalidDeceleration(v) => {
                write!(f, "Deceleration must be greater than 0.0, was {}", v)
            }
            ArgumentError::InvalidFullStepsPerRev(v) => {
                write!(f, "Full steps per revolution must be > 0, was {}", v)
            }
            ArgumentError::InvalidAngle(v) => write!(f, "Angle must be finite, was {}", v),
            ArgumentError::UnsupportedMicrosteps(v) => {
                write!(f, "Microstep setting {} is not supported by the driver", v)
            }
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Timeout { what, waited_ms } => write!(
                f,
                "No {} after {} ms. Maybe backend down?",
                what, waited_ms
            ),
            LinkError::Disconnected => write!(f, "Engine thread has terminated"),
            LinkError::Protocol { expected, received } => {
                write!(f, "Expected {}, received {}", expected, received)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::InvalidMicrosteps(v) => {
                write!(f, "Invalid microsteps: {}. Valid values: 1, 2, 4, 8, 16, 32, 64, 128, 256", v)
            }
            ConfigError::DefaultMicrostepsUnsupported(v) => {
                write!(f, "Default microsteps {} not in microstep options", v)
            }
            ConfigError::NoMicrostepOptions => write!(f, "Microstep options must not be empty"),
            ConfigError::NonPositive { field, value } => {
                write!(f, "{} must be > 0, was {}", field, value)
            }
            ConfigError::ZeroFullSteps => write!(f, "Full steps per revolution must be > 0"),
            ConfigError::ZeroInterval(name) => write!(f, "{} must be > 0", name),
            ConfigError::MissingField(name) => write!(f, "{} is required", name),
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for MotorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorError::PinError => write!(f, "GPIO pin operation failed"),
            MotorError::LineOutOfRange(line) => write!(f, "GPIO line {} out of range", line),
        }
    }
}

impl fmt::Display for WaveformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaveformError::OutOfBuffers => write!(f, "No free waveform buffer"),
            WaveformError::EmptyPattern => write!(f, "Pulse pattern is empty"),
            WaveformError::UnknownBuffer(id) => write!(f, "Unknown waveform buffer {}", id),
            WaveformError::TransmitFailed => write!(f, "Waveform transmission failed"),
        }
    }
}

// Conversion impls
impl From<ArgumentError> for Error {
    fn from(e: ArgumentError) -> Self {
        Error::Argument(e)
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Error::Link(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<MotorError> for Error {
    fn from(e: MotorError) -> Self {
        Error::Motor(e)
    }
}

impl From<WaveformError> for Error {
    fn from(e: WaveformError) -> Self {
        Error::Waveform(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ArgumentError {}

#[cfg(feature = "std")]
impl std::error::Error for LinkError {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for MotorError {}

#[cfg(feature = "std")]
impl std::error::Error for WaveformError {}
