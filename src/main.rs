//! Application entry point: a terminal tuner.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`TunerConfig`] from disk (defaults on first run or on error).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the `cpal` source, the YIN estimator and the pipeline.
//! 5. Print readings until Ctrl-C, then stop the pipeline.

use std::sync::Arc;

use anyhow::Context;
use pitch_tuner::{
    audio::CpalSource,
    config::TunerConfig,
    pipeline::{PitchReading, StreamPipeline},
    pitch::YinEstimator,
};

fn print_reading(reading: &PitchReading) {
    let note = &reading.note;
    let direction = if note.is_sharp() {
        "sharp"
    } else if note.is_flat() {
        "flat"
    } else {
        "exact"
    };
    println!(
        "{:<4} {:>9.2} Hz  {:+8.3} Hz  {:+7.1} cents  {:<5}  {}",
        note.note_name,
        reading.frequency_hz(),
        note.deviation_hz,
        note.deviation_cents,
        direction,
        reading.band.label()
    );
}

async fn run(config: TunerConfig) -> anyhow::Result<()> {
    let pipeline = StreamPipeline::new(
        Arc::new(CpalSource::new(config.audio.buffer_size)),
        Arc::new(YinEstimator::from_config(&config.pitch)),
        &config,
    );

    let mut readings = match pipeline.start().await {
        Ok(rx) => rx,
        Err(e) if e.is_permission_denied() => {
            anyhow::bail!("{e}; grant microphone access and try again")
        }
        Err(e) => return Err(e).context("failed to start the tuner"),
    };

    println!(
        "Listening (A4 = {} Hz, {:.0}-{:.0} Hz). Press Ctrl-C to quit.",
        config.note.reference_pitch, config.pitch.min_frequency, config.pitch.max_frequency
    );

    loop {
        tokio::select! {
            reading = readings.recv() => match reading {
                Some(reading) => print_reading(&reading),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    pipeline.stop();
    let stats = pipeline.stats();
    log::info!(
        "{} buffers captured, {} skipped by the throttle, {} estimated, {} readings shown",
        stats.received,
        stats.overwritten,
        stats.estimated,
        stats.delivered
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("pitch tuner starting up");

    // 2. Configuration
    let config = TunerConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        TunerConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4–5. Pipeline
    rt.block_on(run(config))
}
