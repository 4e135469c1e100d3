//! Tuner settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! overrides the keys it names.

use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for the microphone capture stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Frames per [`AudioBuffer`](crate::audio::AudioBuffer) handed to the
    /// pipeline.
    ///
    /// YIN can only see periods up to `buffer_size / 2` samples, so this
    /// bounds the lowest detectable pitch: 2048 frames at 44.1 kHz reach
    /// down to ~43 Hz.
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { buffer_size: 2048 }
    }
}

// ---------------------------------------------------------------------------
// PitchConfig
// ---------------------------------------------------------------------------

/// Settings for the YIN estimator and the range filter behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Estimates at or below this frequency (Hz) are discarded.
    pub min_frequency: f32,
    /// Estimates at or above this frequency (Hz) are discarded.
    pub max_frequency: f32,
    /// Offset added to the minimum of the normalised difference function to
    /// form the YIN threshold.
    pub threshold_offset: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_frequency: 60.0,
            max_frequency: 1500.0,
            threshold_offset: 0.01,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Rate control and delivery settings for the stream pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum milliseconds between the start of two estimation cycles.
    /// Buffers arriving in between overwrite each other; only the latest
    /// one is estimated.  `0` disables throttling (single-flight only).
    pub throttle_ms: u64,
    /// Capacity of the reading channel handed to the consumer.  Readings
    /// are dropped, not queued, when the consumer falls this far behind.
    pub delivery_capacity: usize,
}

impl PipelineConfig {
    /// [`throttle_ms`](Self::throttle_ms) as a [`Duration`].
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 100,
            delivery_capacity: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// NoteConfig
// ---------------------------------------------------------------------------

/// Equal-temperament reference and the "in tune" bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteConfig {
    /// Frequency of A4 in Hz.
    pub reference_pitch: f32,
    /// Deviation percentage below which a reading counts as in tune.
    pub in_tune_percentage: f32,
    /// Deviation percentage at or above which a reading counts as out of
    /// tune.  Values in between are "close".
    pub out_of_tune_percentage: f32,
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self {
            reference_pitch: 440.0,
            in_tune_percentage: 10.0,
            out_of_tune_percentage: 15.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TunerConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level tuner configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use pitch_tuner::config::TunerConfig;
///
/// // Load (returns Default when file is missing)
/// let config = TunerConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Capture settings.
    pub audio: AudioConfig,
    /// Estimator and range filter settings.
    pub pitch: PitchConfig,
    /// Throttle and delivery settings.
    pub pipeline: PipelineConfig,
    /// Note mapping settings.
    pub note: NoteConfig,
}

impl TunerConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(TunerConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let pitch = &self.pitch;
        if !(pitch.min_frequency > 0.0 && pitch.min_frequency < pitch.max_frequency) {
            bail!(
                "invalid frequency range: min {} Hz must be positive and below max {} Hz",
                pitch.min_frequency,
                pitch.max_frequency
            );
        }
        if !(pitch.threshold_offset >= 0.0 && pitch.threshold_offset.is_finite()) {
            bail!("threshold_offset must be a non-negative number");
        }
        if self.audio.buffer_size < 4 {
            bail!(
                "buffer_size {} is too small for pitch estimation (minimum 4)",
                self.audio.buffer_size
            );
        }
        if self.pipeline.delivery_capacity == 0 {
            bail!("delivery_capacity must be at least 1");
        }
        let note = &self.note;
        if !(note.reference_pitch > 0.0 && note.reference_pitch.is_finite()) {
            bail!("reference_pitch must be a positive frequency");
        }
        if note.in_tune_percentage > note.out_of_tune_percentage {
            bail!(
                "in_tune_percentage ({}) must not exceed out_of_tune_percentage ({})",
                note.in_tune_percentage,
                note.out_of_tune_percentage
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = TunerConfig::default();
        original.save_to(&path).expect("save");

        let loaded = TunerConfig::load_from(&path).expect("load");

        assert_eq!(original.audio.buffer_size, loaded.audio.buffer_size);
        assert_eq!(original.pitch.min_frequency, loaded.pitch.min_frequency);
        assert_eq!(original.pitch.max_frequency, loaded.pitch.max_frequency);
        assert_eq!(
            original.pitch.threshold_offset,
            loaded.pitch.threshold_offset
        );
        assert_eq!(original.pipeline.throttle_ms, loaded.pipeline.throttle_ms);
        assert_eq!(
            original.pipeline.delivery_capacity,
            loaded.pipeline.delivery_capacity
        );
        assert_eq!(original.note.reference_pitch, loaded.note.reference_pitch);
        assert_eq!(
            original.note.in_tune_percentage,
            loaded.note.in_tune_percentage
        );
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = TunerConfig::load_from(&path).expect("should not error");
        assert_eq!(config.audio.buffer_size, 2048);
        assert_eq!(config.pipeline.throttle_ms, 100);
    }

    #[test]
    fn default_values() {
        let cfg = TunerConfig::default();

        assert_eq!(cfg.pitch.min_frequency, 60.0);
        assert_eq!(cfg.pitch.max_frequency, 1500.0);
        assert_eq!(cfg.pitch.threshold_offset, 0.01);
        assert_eq!(cfg.pipeline.throttle(), Duration::from_millis(100));
        assert_eq!(cfg.note.reference_pitch, 440.0);
        assert_eq!(cfg.note.in_tune_percentage, 10.0);
        assert_eq!(cfg.note.out_of_tune_percentage, 15.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[pitch]\nmax_frequency = 900.0\n").expect("write");

        let cfg = TunerConfig::load_from(&path).expect("load");
        assert_eq!(cfg.pitch.max_frequency, 900.0);
        assert_eq!(cfg.pitch.min_frequency, 60.0);
        assert_eq!(cfg.note.reference_pitch, 440.0);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = TunerConfig::default();
        cfg.audio.buffer_size = 4096;
        cfg.pitch.min_frequency = 80.0;
        cfg.pitch.max_frequency = 1200.0;
        cfg.pipeline.throttle_ms = 50;
        cfg.note.reference_pitch = 442.0;

        cfg.save_to(&path).expect("save");
        let loaded = TunerConfig::load_from(&path).expect("load");

        assert_eq!(loaded.audio.buffer_size, 4096);
        assert_eq!(loaded.pitch.min_frequency, 80.0);
        assert_eq!(loaded.pitch.max_frequency, 1200.0);
        assert_eq!(loaded.pipeline.throttle_ms, 50);
        assert_eq!(loaded.note.reference_pitch, 442.0);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut cfg = TunerConfig::default();
        cfg.pitch.min_frequency = 2000.0;
        assert!(cfg.validate().is_err());

        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        cfg.save_to(&path).expect("save");
        assert!(TunerConfig::load_from(&path).is_err());
    }

    #[test]
    fn tiny_buffer_is_rejected() {
        let mut cfg = TunerConfig::default();
        cfg.audio.buffer_size = 3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_bands_are_rejected() {
        let mut cfg = TunerConfig::default();
        cfg.note.in_tune_percentage = 20.0;
        assert!(cfg.validate().is_err());
    }
}
