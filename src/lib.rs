//! Real-time pitch tuner.
//!
//! Captures microphone audio, estimates the fundamental frequency of the
//! most recent buffer with the YIN method, and reports the nearest
//! equal-tempered note with its deviation.
//!
//! - [`audio`]: capture contract, `cpal` source, re-framing, amplitude tap.
//! - [`pitch`]: YIN estimator and the frequency range filter.
//! - [`note`]: frequency to note mapping and tuning bands.
//! - [`pipeline`]: the latest-value throttled streaming pipeline.
//! - [`config`]: TOML settings.

pub mod audio;
pub mod config;
pub mod note;
pub mod pipeline;
pub mod pitch;
