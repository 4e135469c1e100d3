//! Audio input: the capture contract, the `cpal` implementation, re-framing
//! and the amplitude side channel.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → downmix → FrameAssembler → AudioBuffer
//!           → FrameSink (pipeline intake) ─┬─▶ latest-value mailbox
//!                                          └─▶ AmplitudeFrame (watch)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pitch_tuner::audio::{AudioFrameSource, CpalSource, FrameSink};
//!
//! let source = CpalSource::new(2048);
//! source
//!     .start(FrameSink::new(|buffer| {
//!         println!("{} frames @ {}Hz", buffer.frame_count(), buffer.sample_rate());
//!     }))
//!     .unwrap();
//! ```

pub mod capture;
pub mod framing;
pub mod source;
pub mod waveform;

pub use capture::CpalSource;
pub use framing::{downmix, FrameAssembler};
pub use source::{AudioBuffer, AudioFrameSource, CaptureError, FrameSink, PermissionStatus};
pub use waveform::AmplitudeFrame;

#[cfg(test)]
pub use source::MockSource;
