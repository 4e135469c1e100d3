//! Fundamental-frequency estimation.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │              PitchEstimator (trait)                │
//! │                                                    │
//! │   ┌──────────────┐      ┌──────────────────────┐   │
//! │   │ YinEstimator │ ───▶ │ difference (rayon)   │   │
//! │   │ - offset     │      │ cmnd (prefix scan)   │   │
//! │   └──────────────┘      │ threshold + dip walk │   │
//! │                         └──────────┬───────────┘   │
//! │                                    ▼               │
//! │                        Option<ToneEstimate>        │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust
//! use pitch_tuner::pitch::{FrequencyRange, PitchEstimator, YinEstimator};
//!
//! let estimator = YinEstimator::default();
//! let silence = vec![0.0_f32; 2048];
//! assert!(estimator.estimate(&silence, 44_100).is_none());
//!
//! let range = FrequencyRange::default();
//! assert!(range.contains(440.0));
//! ```

pub mod estimator;
pub mod yin;

pub use estimator::{FrequencyRange, PitchEstimator, ToneEstimate};
pub use yin::{
    cumulative_mean_normalized_difference, difference_function, threshold_lag, YinEstimator,
    DEFAULT_THRESHOLD_OFFSET,
};

#[cfg(test)]
pub use estimator::MockEstimator;
