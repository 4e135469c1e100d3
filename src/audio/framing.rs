//! Channel downmixing and re-framing of device callback data.
//!
//! Audio hosts deliver interleaved samples in whatever chunk size suits the
//! driver.  The estimator wants mono blocks of one fixed length, so
//! [`FrameAssembler`] downmixes each chunk and cuts the result into
//! [`AudioBuffer`]s of exactly `frame_size` samples, carrying any remainder
//! over to the next callback.

use super::AudioBuffer;

// ---------------------------------------------------------------------------
// downmix
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use pitch_tuner::audio::downmix;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Accumulates callback chunks into fixed-size mono [`AudioBuffer`]s.
///
/// # Example
///
/// ```rust
/// use pitch_tuner::audio::FrameAssembler;
///
/// let mut framer = FrameAssembler::new(4, 1, 8_000);
/// assert!(framer.push(&[0.1, 0.2, 0.3]).is_empty());
/// let out = framer.push(&[0.4, 0.5]);
/// assert_eq!(out.len(), 1);
/// assert_eq!(out[0].samples(), &[0.1, 0.2, 0.3, 0.4]);
/// assert_eq!(framer.pending_len(), 1);
/// ```
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    channels: u16,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl FrameAssembler {
    /// Create an assembler producing `frame_size`-sample buffers from
    /// `channels`-wide interleaved input at `sample_rate` Hz.
    ///
    /// # Panics
    ///
    /// Panics if `frame_size == 0`.
    pub fn new(frame_size: usize, channels: u16, sample_rate: u32) -> Self {
        assert!(frame_size > 0, "FrameAssembler frame_size must be > 0");
        Self {
            frame_size,
            channels,
            sample_rate,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Feed one interleaved chunk; returns every buffer it completed, oldest
    /// first.
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<AudioBuffer> {
        if self.channels == 1 {
            self.pending.extend_from_slice(interleaved);
        } else {
            self.pending.extend(downmix(interleaved, self.channels));
        }

        let complete = self.pending.len() / self.frame_size;
        if complete == 0 {
            return Vec::new();
        }

        let mut frames = Vec::with_capacity(complete);
        let mut rest = self.pending.split_off(complete * self.frame_size);
        std::mem::swap(&mut rest, &mut self.pending);
        for chunk in rest.chunks_exact(self.frame_size) {
            frames.push(AudioBuffer::new(chunk.to_vec(), self.sample_rate));
        }
        frames
    }

    /// Mono samples waiting for the next buffer to fill up.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard the partial buffer.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
