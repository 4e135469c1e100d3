//! YIN fundamental-frequency estimation.
//!
//! ## Algorithm
//!
//! For a buffer of `n` samples and `tau_max = n / 2`:
//!
//! 1. Difference function `d(τ) = Σ_{i=0}^{n-τ-1} (x_i - x_{i+τ})²` for
//!    `τ ∈ [1, tau_max)`.  Every lag is independent, so the lags are spread
//!    over the rayon pool; each worker writes only its own slot.
//! 2. Cumulative mean normalised difference `d'(0) = 1`,
//!    `d'(τ) = d(τ) · τ / Σ_{j=1}^{τ} d(j)`.  Sequential prefix scan.
//! 3. Threshold `min(d') + offset`, first lag below it, then walk forward to
//!    the bottom of that dip.
//! 4. `f = sample_rate / τ`.
//!
//! The threshold is relative to the buffer's own minimum rather than the
//! fixed absolute 0.1 of the YIN paper.  This picks a different lag on noisy
//! input and is kept on purpose.

use rayon::prelude::*;

use crate::config::PitchConfig;

use super::estimator::{PitchEstimator, ToneEstimate};

/// Offset added to the CMND minimum to form the search threshold.
pub const DEFAULT_THRESHOLD_OFFSET: f32 = 0.01;

/// Buffers shorter than this never produce an estimate.
pub const MIN_FRAMES: usize = 4;

/// Lags per rayon task; keeps tiny buffers from being split into
/// single-lag jobs.
const MIN_LAGS_PER_TASK: usize = 16;

// ---------------------------------------------------------------------------
// YinEstimator
// ---------------------------------------------------------------------------

/// Production [`PitchEstimator`] implementing YIN.
///
/// # Example
///
/// ```rust
/// use pitch_tuner::pitch::{PitchEstimator, YinEstimator};
///
/// let rate = 48_000;
/// let signal: Vec<f32> = (0..2048)
///     .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / rate as f32).sin())
///     .collect();
///
/// let est = YinEstimator::default().estimate(&signal, rate).unwrap();
/// assert!((est.frequency_hz() - 1000.0).abs() < 20.0);
/// ```
#[derive(Debug, Clone)]
pub struct YinEstimator {
    threshold_offset: f32,
}

impl YinEstimator {
    pub fn new(threshold_offset: f32) -> Self {
        Self { threshold_offset }
    }

    pub fn from_config(config: &PitchConfig) -> Self {
        Self::new(config.threshold_offset)
    }

    pub fn threshold_offset(&self) -> f32 {
        self.threshold_offset
    }
}

impl Default for YinEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_OFFSET)
    }
}

impl PitchEstimator for YinEstimator {
    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Option<ToneEstimate> {
        if samples.len() < MIN_FRAMES {
            return None;
        }

        let tau_max = samples.len() / 2;
        let diff = difference_function(samples, tau_max);
        let cmnd = cumulative_mean_normalized_difference(&diff);
        let tau = threshold_lag(&cmnd, self.threshold_offset)?;

        ToneEstimate::from_lag(sample_rate, tau)
    }
}

// ---------------------------------------------------------------------------
// YIN steps
// ---------------------------------------------------------------------------

/// Squared-difference energy for every lag in `[0, tau_max)`.
///
/// `diff[0]` is left at `0.0`; lag 0 is never a period.
pub fn difference_function(samples: &[f32], tau_max: usize) -> Vec<f32> {
    let n = samples.len();
    let tau_max = tau_max.min(n);
    let mut diff = vec![0.0_f32; tau_max];

    diff.par_iter_mut()
        .with_min_len(MIN_LAGS_PER_TASK)
        .enumerate()
        .skip(1)
        .for_each(|(tau, slot)| {
            *slot = samples[..n - tau]
                .iter()
                .zip(&samples[tau..])
                .map(|(a, b)| {
                    let delta = a - b;
                    delta * delta
                })
                .sum();
        });

    diff
}

/// Cumulative mean normalised difference of `diff`; same length, `[0] = 1`.
///
/// While the running sum is still zero (silence, DC) the entry is `1.0`
/// instead of `0 / 0`.
pub fn cumulative_mean_normalized_difference(diff: &[f32]) -> Vec<f32> {
    let mut cmnd = vec![0.0_f32; diff.len()];
    if let Some(first) = cmnd.first_mut() {
        *first = 1.0;
    }

    let mut running_sum = 0.0_f32;
    for tau in 1..diff.len() {
        running_sum += diff[tau];
        cmnd[tau] = if running_sum > 0.0 {
            diff[tau] / (running_sum / tau as f32)
        } else {
            1.0
        };
    }

    cmnd
}

/// First lag whose CMND falls below `min(cmnd) + offset`, advanced to the
/// bottom of its dip.
///
/// `None` when nothing crosses, or when only lag 0 does (every value is
/// within `offset` of 1.0, i.e. there is no periodicity to speak of).
pub fn threshold_lag(cmnd: &[f32], offset: f32) -> Option<usize> {
    let min_value = cmnd.iter().copied().fold(f32::INFINITY, f32::min);
    let threshold = min_value + offset;

    let first = cmnd.iter().position(|&v| v < threshold)?;
    if first == 0 {
        return None;
    }

    let mut tau = first;
    while tau + 1 < cmnd.len() && cmnd[tau + 1] < cmnd[tau] {
        tau += 1;
    }
    Some(tau)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(frequency: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin() * 0.8)
            .collect()
    }

    fn assert_close(expected: f32, got: Option<ToneEstimate>) {
        let got = got.expect("expected a pitch estimate").frequency_hz();
        let rel = (got - expected).abs() / expected;
        assert!(rel < 0.02, "expected ~{expected} Hz, got {got} Hz");
    }

    // ---- estimate ----------------------------------------------------------

    #[test]
    fn a440_at_44k1() {
        let yin = YinEstimator::default();
        assert_close(440.0, yin.estimate(&sine(440.0, 44_100, 2048), 44_100));
    }

    #[test]
    fn low_e_string_at_48k() {
        let yin = YinEstimator::default();
        assert_close(82.41, yin.estimate(&sine(82.41, 48_000, 4096), 48_000));
    }

    #[test]
    fn a2_with_harmonics() {
        // Fundamental plus a strong octave and fifth above.
        let rate = 44_100;
        let signal: Vec<f32> = (0..2048)
            .map(|i| {
                let t = i as f32 / rate as f32;
                0.5 * (2.0 * PI * 110.0 * t).sin()
                    + 0.3 * (2.0 * PI * 220.0 * t).sin()
                    + 0.2 * (2.0 * PI * 330.0 * t).sin()
            })
            .collect();
        assert_close(110.0, YinEstimator::default().estimate(&signal, rate));
    }

    #[test]
    fn exact_period_gives_exact_frequency() {
        let est = YinEstimator::default()
            .estimate(&sine(1000.0, 48_000, 2048), 48_000)
            .unwrap();
        assert_eq!(est.tau(), 48);
        assert_eq!(est.frequency_hz(), 1000.0);
    }

    #[test]
    fn silence_gives_no_estimate() {
        let yin = YinEstimator::default();
        assert!(yin.estimate(&vec![0.0; 2048], 44_100).is_none());
    }

    #[test]
    fn constant_signal_gives_no_estimate() {
        let yin = YinEstimator::default();
        assert!(yin.estimate(&vec![0.5; 2048], 44_100).is_none());
    }

    #[test]
    fn short_buffers_give_no_estimate() {
        let yin = YinEstimator::default();
        assert!(yin.estimate(&[], 44_100).is_none());
        assert!(yin.estimate(&[0.1, -0.1, 0.1], 44_100).is_none());
    }

    // ---- difference / cmnd -------------------------------------------------

    #[test]
    fn parallel_difference_matches_sequential() {
        let signal = sine(300.0, 44_100, 1024);
        let tau_max = signal.len() / 2;
        let diff = difference_function(&signal, tau_max);

        assert_eq!(diff.len(), tau_max);
        assert_eq!(diff[0], 0.0);
        for tau in 1..tau_max {
            let mut expected = 0.0_f32;
            for i in 0..signal.len() - tau {
                let delta = signal[i] - signal[i + tau];
                expected += delta * delta;
            }
            assert!(
                (diff[tau] - expected).abs() <= 1e-3 * expected.max(1.0),
                "tau {tau}: {} vs {expected}",
                diff[tau]
            );
        }
    }

    #[test]
    fn cmnd_starts_at_one_and_matches_length() {
        for frames in [4_usize, 5, 64, 2048] {
            let signal = sine(440.0, 44_100, frames);
            let diff = difference_function(&signal, frames / 2);
            let cmnd = cumulative_mean_normalized_difference(&diff);
            assert_eq!(diff.len(), frames / 2);
            assert_eq!(cmnd.len(), diff.len());
            assert_eq!(cmnd[0], 1.0);
        }
    }

    #[test]
    fn cmnd_of_silence_is_all_ones() {
        let cmnd = cumulative_mean_normalized_difference(&[0.0; 16]);
        assert!(cmnd.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn cmnd_normalises_by_running_mean() {
        let cmnd = cumulative_mean_normalized_difference(&[0.0, 2.0, 4.0, 0.0]);
        assert_eq!(cmnd[1], 1.0); // 2 / (2 / 1)
        assert!((cmnd[2] - 4.0 / 3.0).abs() < 1e-6); // 4 / (6 / 2)
        assert_eq!(cmnd[3], 0.0);
    }

    #[test]
    fn cmnd_of_empty_diff_is_empty() {
        assert!(cumulative_mean_normalized_difference(&[]).is_empty());
    }

    // ---- threshold search --------------------------------------------------

    #[test]
    fn threshold_picks_first_crossing() {
        let cmnd = [1.0, 0.5, 0.2, 0.1, 0.3];
        assert_eq!(threshold_lag(&cmnd, 0.01), Some(3));
    }

    #[test]
    fn threshold_walks_to_bottom_of_dip() {
        let cmnd = [1.0, 0.8, 0.005, 0.003, 0.001, 0.2, 0.0];
        assert_eq!(threshold_lag(&cmnd, 0.01), Some(4));
    }

    #[test]
    fn threshold_prefers_early_dip_over_global_minimum() {
        // 0.009 is within 0.01 of the global minimum 0.0 at lag 6.
        let cmnd = [1.0, 0.9, 0.009, 0.5, 0.7, 0.3, 0.0];
        assert_eq!(threshold_lag(&cmnd, 0.01), Some(2));
    }

    #[test]
    fn threshold_rejects_flat_cmnd() {
        assert_eq!(threshold_lag(&[1.0, 0.995, 0.999], 0.01), None);
        assert_eq!(threshold_lag(&[1.0; 8], 0.01), None);
        assert_eq!(threshold_lag(&[], 0.01), None);
    }

    #[test]
    fn found_lag_satisfies_threshold_and_local_minimum() {
        for (freq, rate) in [(440.0, 44_100), (196.0, 48_000), (1318.5, 44_100)] {
            let signal = sine(freq, rate, 2048);
            let diff = difference_function(&signal, signal.len() / 2);
            let cmnd = cumulative_mean_normalized_difference(&diff);
            let min_value = cmnd.iter().copied().fold(f32::INFINITY, f32::min);

            let tau = threshold_lag(&cmnd, DEFAULT_THRESHOLD_OFFSET).expect("lag");
            assert!(tau > 0);
            assert!(cmnd[tau] < min_value + DEFAULT_THRESHOLD_OFFSET);
            if tau + 1 < cmnd.len() {
                assert!(cmnd[tau + 1] >= cmnd[tau]);
            }
        }
    }

    #[test]
    fn estimator_uses_configured_offset() {
        let cfg = PitchConfig {
            threshold_offset: 0.05,
            ..PitchConfig::default()
        };
        assert_eq!(YinEstimator::from_config(&cfg).threshold_offset(), 0.05);
        assert_eq!(
            YinEstimator::default().threshold_offset(),
            DEFAULT_THRESHOLD_OFFSET
        );
    }
}
