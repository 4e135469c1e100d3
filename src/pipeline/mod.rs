//! Streaming pitch pipeline.
//!
//! Wires an [`AudioFrameSource`](crate::audio::AudioFrameSource) to a
//! [`PitchEstimator`](crate::pitch::PitchEstimator) through a latest-value
//! throttle, filters estimates to the configured frequency range, maps them
//! to notes and hands the results to a consumer.
//!
//! # Architecture
//!
//! ```text
//! audio thread                      tokio runtime
//! ────────────                      ─────────────
//! FrameSink::push ──▶ LatestSlot ──▶ worker task ──▶ spawn_blocking(estimate)
//!       │             (1 element,         │
//!       │              overwrite)         ├─ FrequencyRange filter
//!       ▼                                 ├─ NoteMapper::map + classify
//! watch<AmplitudeFrame>                   └─ mpsc<PitchReading> ──▶ consumer
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pitch_tuner::audio::CpalSource;
//! use pitch_tuner::config::TunerConfig;
//! use pitch_tuner::pipeline::StreamPipeline;
//! use pitch_tuner::pitch::YinEstimator;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TunerConfig::default();
//!     let pipeline = StreamPipeline::new(
//!         Arc::new(CpalSource::new(config.audio.buffer_size)),
//!         Arc::new(YinEstimator::from_config(&config.pitch)),
//!         &config,
//!     );
//!
//!     let mut readings = pipeline.start().await.expect("microphone");
//!     if let Some(reading) = readings.recv().await {
//!         println!("{} is {}", reading.note, reading.band.label());
//!     }
//!     pipeline.stop();
//! }
//! ```

pub mod mailbox;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use mailbox::LatestSlot;
pub use runner::{PitchReading, StreamPipeline};
pub use state::{PipelineState, PipelineStats, StatsSnapshot};
