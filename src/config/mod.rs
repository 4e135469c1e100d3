//! Configuration module for the tuner.
//!
//! Provides `TunerConfig` (top-level settings), sub-configs for each
//! pipeline stage, `AppPaths` for the platform config directory, and TOML
//! persistence via `TunerConfig::load` / `TunerConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AudioConfig, NoteConfig, PipelineConfig, PitchConfig, TunerConfig};
