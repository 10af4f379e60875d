//! In-memory waveform backend.
//!
//! Plays buffers back against the wall clock, optionally sped up, and records
//! every transmitted pattern in a [`WaveformLog`] that tests can inspect while
//! the engine thread owns the backend.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::WaveformError;

use super::{BufferId, PulsePattern, TransmitMode, WaveformBackend};

/// Buffer slots available, matching the limit of common GPIO daemons.
pub const DEFAULT_MAX_BUFFERS: usize = 250;

/// Transmitted patterns a [`WaveformLog`] keeps before dropping the oldest.
pub const DEFAULT_LOG_CAPACITY: usize = 4096;

/// Shared record of what a [`SimulatedWaveform`] played.
///
/// Counters cover the whole lifetime of the backend; only the most recent
/// patterns are kept, so a long continuous run stays bounded.
#[derive(Debug, Clone)]
pub struct WaveformLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug)]
struct LogInner {
    recent: VecDeque<PulsePattern>,
    capacity: usize,
    transmit_count: usize,
    released: usize,
    clears: usize,
}

impl Default for WaveformLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl WaveformLog {
    /// A log keeping at most `capacity` patterns; `0` keeps counters only.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                recent: VecDeque::new(),
                capacity,
                transmit_count: 0,
                released: 0,
                clears: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, pattern: PulsePattern) {
        let mut inner = self.lock();
        inner.transmit_count += 1;
        if inner.capacity == 0 {
            return;
        }
        if inner.recent.len() == inner.capacity {
            inner.recent.pop_front();
        }
        inner.recent.push_back(pattern);
    }

    /// Most recently transmitted patterns, oldest first.
    pub fn transmitted(&self) -> Vec<PulsePattern> {
        self.lock().recent.iter().cloned().collect()
    }

    /// Number of patterns transmitted.
    pub fn transmit_count(&self) -> usize {
        self.lock().transmit_count
    }

    /// Number of buffers released.
    pub fn released(&self) -> usize {
        self.lock().released
    }

    /// Number of `clear_all` calls.
    pub fn clears(&self) -> usize {
        self.lock().clears
    }
}

/// Wall-clock simulation of a waveform generator.
#[derive(Debug)]
pub struct SimulatedWaveform {
    /// Real seconds per simulated second; `0.0` plays everything instantly.
    time_scale: f64,
    max_buffers: usize,
    next_id: u32,
    buffers: BTreeMap<BufferId, PulsePattern>,
    /// Head is playing, the rest queued behind it.
    queue: VecDeque<(BufferId, Duration)>,
    head_started: Option<Instant>,
    log: WaveformLog,
}

impl SimulatedWaveform {
    /// A backend playing in real time.
    pub fn new() -> Self {
        Self::with_time_scale(1.0)
    }

    /// A backend where every buffer completes as soon as it starts.
    pub fn instant() -> Self {
        Self::with_time_scale(0.0)
    }

    /// A backend playing `time_scale` times slower than real time.
    pub fn with_time_scale(time_scale: f64) -> Self {
        Self {
            time_scale: time_scale.max(0.0),
            max_buffers: DEFAULT_MAX_BUFFERS,
            next_id: 0,
            buffers: BTreeMap::new(),
            queue: VecDeque::new(),
            head_started: None,
            log: WaveformLog::default(),
        }
    }

    /// Limit the number of simultaneously held buffers.
    pub fn with_max_buffers(mut self, max_buffers: usize) -> Self {
        self.max_buffers = max_buffers;
        self
    }

    /// Keep at most `capacity` transmitted patterns. Call before taking
    /// [`log`](Self::log) handles; earlier handles keep the old record.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log = WaveformLog::with_capacity(capacity);
        self
    }

    /// Handle on the transmission record.
    pub fn log(&self) -> WaveformLog {
        self.log.clone()
    }

    /// Buffers currently held.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Retire every buffer whose playback time has elapsed.
    fn advance(&mut self) {
        let Some(mut started) = self.head_started else {
            return;
        };
        let now = Instant::now();

        while let Some(&(_, length)) = self.queue.front() {
            let end = started + length;
            if end > now {
                break;
            }
            self.queue.pop_front();
            started = end;
        }

        self.head_started = if self.queue.is_empty() {
            None
        } else {
            Some(started)
        };
    }

    fn playback_length(&self, pattern: &PulsePattern) -> Duration {
        Duration::from_micros(pattern.duration_us()).mul_f64(self.time_scale)
    }
}

impl Default for SimulatedWaveform {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveformBackend for SimulatedWaveform {
    fn submit(&mut self, pattern: &PulsePattern) -> Result<BufferId, WaveformError> {
        if pattern.is_empty() {
            return Err(WaveformError::EmptyPattern);
        }
        if self.buffers.len() >= self.max_buffers {
            return Err(WaveformError::OutOfBuffers);
        }

        let id = BufferId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.buffers.insert(id, pattern.clone());
        Ok(id)
    }

    fn transmit(&mut self, id: BufferId, mode: TransmitMode) -> Result<(), WaveformError> {
        let pattern = self
            .buffers
            .get(&id)
            .ok_or(WaveformError::UnknownBuffer(id.0))?
            .clone();
        let length = self.playback_length(&pattern);

        self.advance();
        match mode {
            TransmitMode::Immediate => {
                self.queue.clear();
                self.head_started = Some(Instant::now());
            }
            TransmitMode::QueueAfterCurrent => {
                if self.queue.is_empty() {
                    self.head_started = Some(Instant::now());
                }
            }
        }
        self.queue.push_back((id, length));

        self.log.record(pattern);
        Ok(())
    }

    fn currently_transmitting(&mut self) -> Option<BufferId> {
        self.advance();
        self.queue.front().map(|&(id, _)| id)
    }

    fn is_busy(&mut self) -> bool {
        self.advance();
        !self.queue.is_empty()
    }

    fn release(&mut self, id: BufferId) -> Result<(), WaveformError> {
        self.buffers
            .remove(&id)
            .ok_or(WaveformError::UnknownBuffer(id.0))?;
        self.log.lock().released += 1;
        Ok(())
    }

    fn clear_all(&mut self) {
        self.buffers.clear();
        self.queue.clear();
        self.head_started = None;
        self.log.lock().clears += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_backend_never_busy() {
        let mut backend = SimulatedWaveform::instant();
        let id = backend.submit(&PulsePattern::delay(1_000)).unwrap();
        backend.transmit(id, TransmitMode::Immediate).unwrap();

        assert!(!backend.is_busy());
        assert_eq!(backend.currently_transmitting(), None);
        assert_eq!(backend.log().transmit_count(), 1);
    }

    #[test]
    fn test_queue_after_current() {
        let mut backend = SimulatedWaveform::new();
        let first = backend.submit(&PulsePattern::delay(200_000)).unwrap();
        let second = backend.submit(&PulsePattern::delay(200_000)).unwrap();

        backend.transmit(first, TransmitMode::Immediate).unwrap();
        backend.transmit(second, TransmitMode::QueueAfterCurrent).unwrap();

        assert_eq!(backend.currently_transmitting(), Some(first));
        assert!(backend.is_busy());
    }

    #[test]
    fn test_immediate_replaces_queue() {
        let mut backend = SimulatedWaveform::new();
        let first = backend.submit(&PulsePattern::delay(200_000)).unwrap();
        let second = backend.submit(&PulsePattern::delay(200_000)).unwrap();

        backend.transmit(first, TransmitMode::Immediate).unwrap();
        backend.transmit(second, TransmitMode::Immediate).unwrap();

        assert_eq!(backend.currently_transmitting(), Some(second));
    }

    #[test]
    fn test_playback_finishes() {
        let mut backend = SimulatedWaveform::new();
        let id = backend.submit(&PulsePattern::delay(1_000)).unwrap();
        backend.transmit(id, TransmitMode::Immediate).unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert!(!backend.is_busy());
    }

    #[test]
    fn test_release_and_clear() {
        let mut backend = SimulatedWaveform::instant();
        let id = backend.submit(&PulsePattern::delay(10)).unwrap();

        backend.release(id).unwrap();
        assert_eq!(
            backend.release(id),
            Err(WaveformError::UnknownBuffer(id.0))
        );

        backend.submit(&PulsePattern::delay(10)).unwrap();
        backend.clear_all();
        assert_eq!(backend.buffer_count(), 0);
        assert_eq!(backend.log().released(), 1);
        assert_eq!(backend.log().clears(), 1);
    }

    #[test]
    fn test_log_keeps_only_recent_patterns() {
        let mut backend = SimulatedWaveform::instant().with_log_capacity(2);
        for delay in [10, 20, 30] {
            let id = backend.submit(&PulsePattern::delay(delay)).unwrap();
            backend.transmit(id, TransmitMode::QueueAfterCurrent).unwrap();
            backend.release(id).unwrap();
        }

        let log = backend.log();
        assert_eq!(log.transmit_count(), 3);
        assert_eq!(
            log.transmitted(),
            vec![PulsePattern::delay(20), PulsePattern::delay(30)]
        );
    }

    #[test]
    fn test_log_without_patterns_still_counts() {
        let mut backend = SimulatedWaveform::instant().with_log_capacity(0);
        let id = backend.submit(&PulsePattern::delay(10)).unwrap();
        backend.transmit(id, TransmitMode::Immediate).unwrap();

        assert_eq!(backend.log().transmit_count(), 1);
        assert!(backend.log().transmitted().is_empty());
    }

    #[test]
    fn test_buffer_limit() {
        let mut backend = SimulatedWaveform::instant().with_max_buffers(2);
        backend.submit(&PulsePattern::delay(10)).unwrap();
        backend.submit(&PulsePattern::delay(10)).unwrap();

        assert_eq!(
            backend.submit(&PulsePattern::delay(10)),
            Err(WaveformError::OutOfBuffers)
        );
        assert_eq!(
            backend.submit(&PulsePattern::new()),
            Err(WaveformError::EmptyPattern)
        );
    }
}
