//! Amplitude frames for the live chart.
//!
//! Every buffer the source produces is reduced to an [`AmplitudeFrame`] and
//! published on the pipeline's side channel, independent of whether the
//! buffer is ever pitch-estimated.
//!
//! # Example
//!
//! ```rust
//! use pitch_tuner::audio::AmplitudeFrame;
//!
//! let audio: Vec<f32> = (0..2048)
//!     .map(|i| (i as f32 * 0.05).sin() * 0.5)
//!     .collect();
//!
//! let frame = AmplitudeFrame::from_samples(&audio);
//! assert!(frame.samples.iter().all(|&s| s > 0.0 && s <= 1.0));
//!
//! let bars = frame.bars(20);
//! assert_eq!(bars.len(), 20);
//! ```

/// Samples at or below this level count as background noise.
const ACTIVITY_LEVEL: f32 = 0.01;

/// A buffer needs more than this many samples above [`ACTIVITY_LEVEL`] before
/// the noise floor is trimmed away.
const ACTIVITY_MIN_COUNT: usize = 100;

// ---------------------------------------------------------------------------
// AmplitudeFrame
// ---------------------------------------------------------------------------

/// Owned, clipped amplitude slice derived from one captured buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmplitudeFrame {
    /// Positive sample values in `(0.0, 1.0]`, in capture order.
    pub samples: Vec<f32>,
}

impl AmplitudeFrame {
    /// Build a chart frame from raw mono samples.
    ///
    /// Only positive half-waves are kept.  When the buffer carries a clear
    /// signal (more than 100 samples above `0.01`) the quiet samples are
    /// dropped too, so the chart shows the signal rather than the floor.
    /// Values are clipped to `1.0`.
    pub fn from_samples(samples: &[f32]) -> Self {
        let positive = samples.iter().copied().filter(|&s| s > 0.0);

        let active = samples.iter().filter(|&&s| s > ACTIVITY_LEVEL).count();
        let samples: Vec<f32> = if active > ACTIVITY_MIN_COUNT {
            positive
                .filter(|&s| s > ACTIVITY_LEVEL)
                .map(|s| s.min(1.0))
                .collect()
        } else {
            positive.map(|s| s.min(1.0)).collect()
        };

        Self { samples }
    }

    /// Reduce the frame to `num_bars` RMS values in `[0.0, 1.0]`.
    ///
    /// The samples are divided into `num_bars` equal chunks; any bars left
    /// over when there are fewer samples than bars are `0.0`.
    pub fn bars(&self, num_bars: usize) -> Vec<f32> {
        if num_bars == 0 {
            return Vec::new();
        }
        if self.samples.is_empty() {
            return vec![0.0; num_bars];
        }

        let chunk_size = (self.samples.len() / num_bars).max(1);

        let mut bars: Vec<f32> = self
            .samples
            .chunks(chunk_size)
            .take(num_bars)
            .map(|chunk| {
                let mean_sq: f32 = chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32;
                mean_sq.sqrt().min(1.0)
            })
            .collect();

        bars.resize(num_bars, 0.0);
        bars
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest sample in the frame, `0.0` when empty.
    pub fn peak(&self) -> f32 {
        self.samples.iter().cloned().fold(0.0_f32, f32::max)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_and_zero_samples_are_dropped() {
        let frame = AmplitudeFrame::from_samples(&[-0.5, 0.0, 0.2, -0.1, 0.3]);
        assert_eq!(frame.samples, vec![0.2, 0.3]);
    }

    #[test]
    fn quiet_buffer_keeps_small_positive_samples() {
        // Only 50 loud samples: the floor is kept.
        let mut audio = vec![0.005_f32; 200];
        audio.extend(vec![0.5_f32; 50]);
        let frame = AmplitudeFrame::from_samples(&audio);
        assert_eq!(frame.len(), 250);
    }

    #[test]
    fn loud_buffer_drops_noise_floor() {
        let mut audio = vec![0.005_f32; 200];
        audio.extend(vec![0.5_f32; 150]);
        let frame = AmplitudeFrame::from_samples(&audio);
        assert_eq!(frame.len(), 150);
        assert!(frame.samples.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn samples_are_clipped_to_one() {
        let frame = AmplitudeFrame::from_samples(&[1.7, 0.4]);
        assert_eq!(frame.samples, vec![1.0, 0.4]);
        assert_eq!(frame.peak(), 1.0);
    }

    #[test]
    fn silence_gives_empty_frame_and_zero_bars() {
        let frame = AmplitudeFrame::from_samples(&[0.0; 512]);
        assert!(frame.is_empty());
        assert_eq!(frame.peak(), 0.0);
        assert_eq!(frame.bars(8), vec![0.0; 8]);
    }

    #[test]
    fn bars_have_requested_count_and_range() {
        let frame = AmplitudeFrame::from_samples(&vec![0.3_f32; 1_600]);
        let bars = frame.bars(10);
        assert_eq!(bars.len(), 10);
        for &b in &bars {
            assert!((b - 0.3).abs() < 1e-4, "bar = {b}");
        }
    }

    #[test]
    fn zero_bars_is_empty() {
        let frame = AmplitudeFrame::from_samples(&[0.5; 10]);
        assert!(frame.bars(0).is_empty());
    }

    #[test]
    fn short_frame_pads_bars_with_zero() {
        let frame = AmplitudeFrame::from_samples(&[0.5]);
        let bars = frame.bars(10);
        assert_eq!(bars.len(), 10);
        assert!(bars.iter().skip(1).all(|&b| b == 0.0));
    }
}
