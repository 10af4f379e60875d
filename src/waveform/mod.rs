//! Pulse patterns and the waveform backend they are transmitted through.
//!
//! A driver turns every step into a [`PulsePattern`]: a short list of GPIO
//! level changes, each followed by a delay. The engine hands the pattern to a
//! [`WaveformBackend`], which buffers it and plays it back with hardware
//! timing, so the engine only has to stay one step ahead.

#[cfg(feature = "std")]
mod simulated;

#[cfg(feature = "std")]
pub use simulated::{SimulatedWaveform, WaveformLog};

use crate::error::WaveformError;

/// Maximum number of pulses a driver may emit for one step.
pub const MAX_PULSES: usize = 8;

/// Number of GPIO lines a pulse mask can address.
pub const MAX_LINES: u8 = 32;

/// Mask bit of a GPIO line; lines past [`MAX_LINES`] map to no bit.
#[inline]
pub const fn line_mask(line: u8) -> u32 {
    match 1u32.checked_shl(line as u32) {
        Some(mask) => mask,
        None => 0,
    }
}

/// One GPIO transition followed by a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pulse {
    /// Bit mask of GPIO lines driven high.
    pub on_mask: u32,
    /// Bit mask of GPIO lines driven low.
    pub off_mask: u32,
    /// Delay after the transition in microseconds.
    pub delay_us: u32,
}

impl Pulse {
    /// A pure delay, touching no line.
    #[inline]
    pub const fn delay(delay_us: u32) -> Self {
        Self {
            on_mask: 0,
            off_mask: 0,
            delay_us,
        }
    }

    /// Drive one line high, then wait.
    #[inline]
    pub const fn high(line: u8, delay_us: u32) -> Self {
        Self {
            on_mask: line_mask(line),
            off_mask: 0,
            delay_us,
        }
    }

    /// Drive one line low, then wait.
    #[inline]
    pub const fn low(line: u8, delay_us: u32) -> Self {
        Self {
            on_mask: 0,
            off_mask: line_mask(line),
            delay_us,
        }
    }
}

/// Ordered pulses making up one step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PulsePattern {
    pulses: heapless::Vec<Pulse, MAX_PULSES>,
}

impl PulsePattern {
    /// Create an empty pattern.
    #[inline]
    pub const fn new() -> Self {
        Self {
            pulses: heapless::Vec::new(),
        }
    }

    /// A pattern holding a single delay.
    pub fn delay(delay_us: u32) -> Self {
        let mut pattern = Self::new();
        pattern.push(Pulse::delay(delay_us));
        pattern
    }

    /// Append a pulse. Pulses beyond [`MAX_PULSES`] are dropped.
    pub fn push(&mut self, pulse: Pulse) {
        if self.pulses.push(pulse).is_err() {
            log::warn!("pulse pattern full, dropping {:?}", pulse);
        }
    }

    /// The pulses in transmission order.
    #[inline]
    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Whether the pattern holds no pulse.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    /// Total playback time in microseconds.
    pub fn duration_us(&self) -> u64 {
        self.pulses.iter().map(|p| u64::from(p.delay_us)).sum()
    }
}

/// Handle of a buffer held by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferId(pub u32);

/// How a buffer is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitMode {
    /// Abort whatever is playing and start now.
    Immediate,
    /// Start as soon as the current buffer finishes, without a gap.
    QueueAfterCurrent,
}

/// Hardware-timed pulse playback.
///
/// Implemented over a GPIO daemon or DMA engine on real hardware; see
/// [`SimulatedWaveform`] for the in-memory implementation.
pub trait WaveformBackend: Send {
    /// Upload a pattern into a new buffer.
    fn submit(&mut self, pattern: &PulsePattern) -> Result<BufferId, WaveformError>;

    /// Start playback of a buffer.
    fn transmit(&mut self, id: BufferId, mode: TransmitMode) -> Result<(), WaveformError>;

    /// Buffer being played right now, if any.
    fn currently_transmitting(&mut self) -> Option<BufferId>;

    /// Whether any buffer is still playing or queued.
    fn is_busy(&mut self) -> bool;

    /// Free a buffer that is no longer playing.
    fn release(&mut self, id: BufferId) -> Result<(), WaveformError>;

    /// Stop playback and free every buffer.
    fn clear_all(&mut self);
}
