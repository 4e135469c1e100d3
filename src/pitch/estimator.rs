//! Core pitch-estimator trait, its result type and the range filter.
//!
//! [`PitchEstimator`] is object-safe and `Send + Sync` so the pipeline can
//! hold it behind an `Arc<dyn PitchEstimator>` and call it from the blocking
//! thread pool.  [`YinEstimator`](crate::pitch::YinEstimator) is the
//! production implementation; [`MockEstimator`] (available under
//! `#[cfg(test)]`) reads its answer straight out of the buffer.

use crate::config::PitchConfig;

// ---------------------------------------------------------------------------
// ToneEstimate
// ---------------------------------------------------------------------------

/// A candidate fundamental frequency and the lag it was found at.
///
/// Can only be built with `tau > 0` and a finite, positive frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneEstimate {
    frequency_hz: f32,
    tau: usize,
}

impl ToneEstimate {
    /// Estimate for a period of `tau` samples at `sample_rate` Hz.
    ///
    /// ```
    /// use pitch_tuner::pitch::ToneEstimate;
    ///
    /// let est = ToneEstimate::from_lag(44_100, 100).unwrap();
    /// assert_eq!(est.frequency_hz(), 441.0);
    /// assert!(ToneEstimate::from_lag(44_100, 0).is_none());
    /// ```
    pub fn from_lag(sample_rate: u32, tau: usize) -> Option<Self> {
        if tau == 0 {
            return None;
        }
        Self::new(sample_rate as f32 / tau as f32, tau)
    }

    /// Estimate with an explicit frequency; `None` if the invariants fail.
    pub fn new(frequency_hz: f32, tau: usize) -> Option<Self> {
        (tau > 0 && frequency_hz.is_finite() && frequency_hz > 0.0)
            .then_some(Self { frequency_hz, tau })
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    /// Period in samples.
    pub fn tau(&self) -> usize {
        self.tau
    }
}

// ---------------------------------------------------------------------------
// FrequencyRange
// ---------------------------------------------------------------------------

/// Open interval `(min_hz, max_hz)` of frequencies worth forwarding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub min_hz: f32,
    pub max_hz: f32,
}

impl FrequencyRange {
    pub fn new(min_hz: f32, max_hz: f32) -> Self {
        Self { min_hz, max_hz }
    }

    pub fn from_config(config: &PitchConfig) -> Self {
        Self::new(config.min_frequency, config.max_frequency)
    }

    /// Strict on both ends: the bounds themselves are outside the range.
    pub fn contains(&self, frequency_hz: f32) -> bool {
        frequency_hz > self.min_hz && frequency_hz < self.max_hz
    }
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self::from_config(&PitchConfig::default())
    }
}

// ---------------------------------------------------------------------------
// PitchEstimator trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for fundamental-frequency estimators.
///
/// # Contract
///
/// - Pure: the same samples and rate always give the same answer.
/// - Returns `None` when there is no pitch to report (silence, noise, too
///   few samples).  That is an expected outcome, not a failure.
pub trait PitchEstimator: Send + Sync {
    /// Estimate the fundamental of mono `samples` captured at `sample_rate` Hz.
    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Option<ToneEstimate>;
}

// Compile-time assertion: Box<dyn PitchEstimator> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PitchEstimator>) {}
};

// ---------------------------------------------------------------------------
// MockEstimator (test double)
// ---------------------------------------------------------------------------

/// Test estimator whose answer is the first sample of the buffer,
/// interpreted as a frequency in Hz (`0.0` or an empty buffer → `None`).
///
/// Optionally sleeps to simulate a slow estimation and counts every call.
#[cfg(test)]
pub struct MockEstimator {
    delay: std::time::Duration,
    calls: std::sync::atomic::AtomicUsize,
    seen: std::sync::Mutex<Vec<f32>>,
}

#[cfg(test)]
impl MockEstimator {
    pub fn instant() -> Self {
        Self::with_delay(std::time::Duration::ZERO)
    }

    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            delay,
            calls: std::sync::atomic::AtomicUsize::new(0),
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// First sample of every buffer estimated so far, in call order.
    pub fn seen(&self) -> Vec<f32> {
        self.seen.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl PitchEstimator for MockEstimator {
    fn estimate(&self, samples: &[f32], _sample_rate: u32) -> Option<ToneEstimate> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let first = *samples.first()?;
        self.seen.lock().unwrap().push(first);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        ToneEstimate::new(first, 1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
