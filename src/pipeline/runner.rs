//! Streaming pitch pipeline: capture → latest-value throttle → estimate →
//! range filter → note mapping → consumer.
//!
//! [`StreamPipeline`] owns the capture source and a single worker task.  The
//! audio callback writes every buffer into a one-element [`LatestSlot`]; the
//! worker takes the newest buffer, estimates it on the blocking pool, and
//! waits out the rest of the throttle interval before looking again.  Buffers
//! that arrive while the worker is busy replace each other, so the consumer
//! always sees the freshest pitch and never a backlog.
//!
//! # Pipeline flow
//!
//! ```text
//! cpal callback ─▶ FrameSink ─┬─▶ AmplitudeFrame (watch, every buffer)
//!                             └─▶ LatestSlot (overwrite)
//!                                      │
//!                                      ▼  worker task
//!                      spawn_blocking(PitchEstimator::estimate)
//!                                      │
//!                          FrequencyRange::contains ── no ──▶ dropped
//!                                      │
//!                          NoteMapper::map + classify
//!                                      │
//!                          DeliveryGate (mpsc, try_send)  ─▶ consumer
//!                                      │
//!                          sleep_until(cycle_start + throttle)
//! ```
//!
//! `stop()` closes the gate before it returns, so a reading still in flight
//! at that moment is discarded rather than delivered.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::audio::{
    AmplitudeFrame, AudioBuffer, AudioFrameSource, CaptureError, FrameSink, PermissionStatus,
};
use crate::config::TunerConfig;
use crate::note::{NoteMapper, NoteResult, TuningBand};
use crate::pitch::{FrequencyRange, PitchEstimator, ToneEstimate};

use super::mailbox::LatestSlot;
use super::state::{PipelineState, PipelineStats, StatsSnapshot};

// ---------------------------------------------------------------------------
// PitchReading
// ---------------------------------------------------------------------------

/// One delivered reading: the raw estimate plus its note interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchReading {
    pub estimate: ToneEstimate,
    pub note: NoteResult,
    pub band: TuningBand,
}

impl PitchReading {
    pub fn frequency_hz(&self) -> f32 {
        self.estimate.frequency_hz()
    }
}

impl fmt::Display for PitchReading {
    /// `A4 +1.234 Hz (441.23 Hz, in tune)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2} Hz, {})",
            self.note,
            self.frequency_hz(),
            self.band.label()
        )
    }
}

/// Turn a raw estimate into a reading, or `None` when there is nothing to
/// report.  Neither case is an error.
pub(crate) fn evaluate(
    estimate: Option<ToneEstimate>,
    range: &FrequencyRange,
    mapper: &NoteMapper,
) -> Option<PitchReading> {
    let Some(estimate) = estimate else {
        log::trace!("pipeline: no pitch in buffer");
        return None;
    };

    let frequency = estimate.frequency_hz();
    if !range.contains(frequency) {
        log::trace!(
            "pipeline: {frequency:.2} Hz outside ({:.0}, {:.0}) Hz",
            range.min_hz,
            range.max_hz
        );
        return None;
    }

    match mapper.map(frequency) {
        Ok(note) => {
            let band = mapper.classify(&note);
            Some(PitchReading {
                estimate,
                note,
                band,
            })
        }
        Err(e) => {
            log::warn!("pipeline: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryGate
// ---------------------------------------------------------------------------

/// The worker's only path to the consumer.  Closing it drops the sender, so
/// no reading can slip through afterwards and the consumer's `recv()` ends.
struct DeliveryGate {
    tx: Mutex<Option<mpsc::Sender<PitchReading>>>,
}

impl DeliveryGate {
    fn new(tx: mpsc::Sender<PitchReading>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::Sender<PitchReading>>> {
        self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deliver(&self, reading: PitchReading) -> bool {
        let guard = self.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(reading) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("pipeline: consumer is behind, reading dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn close(&self) {
        self.lock().take();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    estimator: Arc<dyn PitchEstimator>,
    mapper: NoteMapper,
    range: FrequencyRange,
    throttle: Duration,
    stats: Arc<PipelineStats>,
    gate: Arc<DeliveryGate>,
}

impl Worker {
    async fn run(self, slot: Arc<LatestSlot<AudioBuffer>>) {
        while let Some(buffer) = slot.recv().await {
            let cycle_start = Instant::now();

            let estimator = Arc::clone(&self.estimator);
            let estimate = tokio::task::spawn_blocking(move || {
                estimator.estimate(buffer.samples(), buffer.sample_rate())
            })
            .await
            .unwrap_or_else(|e| {
                log::error!("pipeline: estimator task failed: {e}");
                None
            });
            self.stats.record_estimated();

            if let Some(reading) = evaluate(estimate, &self.range, &self.mapper) {
                log::debug!("pipeline: {reading}");
                if self.gate.deliver(reading) {
                    self.stats.record_delivered();
                }
            }

            if !self.throttle.is_zero() {
                tokio::time::sleep_until(cycle_start + self.throttle).await;
            }
        }
        log::debug!("pipeline: worker exiting");
    }
}

// ---------------------------------------------------------------------------
// StartAttempt
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq, Eq)]
enum OpenState {
    #[default]
    Pending,
    Opened,
    Abandoned,
}

/// Shared between `start()` and the blocking task opening the device, so
/// whichever side finishes second knows the device needs releasing.
#[derive(Debug, Default)]
struct OpenTicket {
    state: Mutex<OpenState>,
}

impl OpenTicket {
    fn lock(&self) -> MutexGuard<'_, OpenState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Called by the opener once the device is up.  `false` means nobody is
    /// waiting for it any more and the opener must stop it.
    fn complete(&self) -> bool {
        let mut state = self.lock();
        if *state == OpenState::Abandoned {
            return false;
        }
        *state = OpenState::Opened;
        true
    }

    /// Called when `start()` gives up.  `true` means the device is already
    /// open and the caller must stop it.
    fn abandon(&self) -> bool {
        let mut state = self.lock();
        match *state {
            OpenState::Opened => true,
            _ => {
                *state = OpenState::Abandoned;
                false
            }
        }
    }
}

/// Cleanup for a `start()` that returns early or whose future is dropped
/// mid-await.  Disarmed once the session is installed.
struct StartAttempt<'a> {
    pipeline: &'a StreamPipeline,
    epoch: u64,
    slot: Option<Arc<LatestSlot<AudioBuffer>>>,
    ticket: Option<Arc<OpenTicket>>,
    armed: bool,
}

impl<'a> StartAttempt<'a> {
    fn new(pipeline: &'a StreamPipeline, epoch: u64) -> Self {
        Self {
            pipeline,
            epoch,
            slot: None,
            ticket: None,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StartAttempt<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(slot) = &self.slot {
            slot.close();
        }
        if let Some(ticket) = self.ticket.take() {
            if ticket.abandon() {
                self.pipeline.source.stop();
            }
        }
        self.pipeline.abandon(self.epoch);
    }
}

// ---------------------------------------------------------------------------
// StreamPipeline
// ---------------------------------------------------------------------------

/// Everything one capture session owns.
struct Session {
    slot: Arc<LatestSlot<AudioBuffer>>,
    gate: Arc<DeliveryGate>,
    worker: JoinHandle<()>,
}

impl Session {
    fn shutdown(self) {
        self.gate.close();
        self.slot.close();
        self.worker.abort();
    }
}

struct Inner {
    state: PipelineState,
    session: Option<Session>,
}

/// Drives capture, estimation and delivery for one audio source.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pitch_tuner::audio::CpalSource;
/// use pitch_tuner::config::TunerConfig;
/// use pitch_tuner::pipeline::StreamPipeline;
/// use pitch_tuner::pitch::YinEstimator;
///
/// # async fn example() -> Result<(), pitch_tuner::audio::CaptureError> {
/// let config = TunerConfig::default();
/// let pipeline = StreamPipeline::new(
///     Arc::new(CpalSource::new(config.audio.buffer_size)),
///     Arc::new(YinEstimator::from_config(&config.pitch)),
///     &config,
/// );
///
/// let mut readings = pipeline.start().await?;
/// while let Some(reading) = readings.recv().await {
///     println!("{reading}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamPipeline {
    source: Arc<dyn AudioFrameSource>,
    estimator: Arc<dyn PitchEstimator>,
    mapper: NoteMapper,
    range: FrequencyRange,
    throttle: Duration,
    delivery_capacity: usize,
    inner: Mutex<Inner>,
    stats: Arc<PipelineStats>,
    amplitude: Arc<watch::Sender<AmplitudeFrame>>,
    /// Bumped by every `stop()`; a `start()` that sees it move gives up.
    epoch: watch::Sender<u64>,
}

impl StreamPipeline {
    pub fn new(
        source: Arc<dyn AudioFrameSource>,
        estimator: Arc<dyn PitchEstimator>,
        config: &TunerConfig,
    ) -> Self {
        let (amplitude, _) = watch::channel(AmplitudeFrame::default());
        let (epoch, _) = watch::channel(0);
        Self {
            source,
            estimator,
            mapper: NoteMapper::from_config(&config.note),
            range: FrequencyRange::from_config(&config.pitch),
            throttle: config.pipeline.throttle(),
            delivery_capacity: config.pipeline.delivery_capacity.max(1),
            inner: Mutex::new(Inner {
                state: PipelineState::Idle,
                session: None,
            }),
            stats: Arc::new(PipelineStats::default()),
            amplitude: Arc::new(amplitude),
            epoch,
        }
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Request permission, open the device and start the worker.
    ///
    /// Returns the receiver readings are delivered on.  It yields `None`
    /// once the pipeline is stopped.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::AlreadyRunning`] while a start is pending or capture
    ///   is running (state unchanged).
    /// - [`CaptureError::Cancelled`] if `stop()` is called before the start
    ///   completes.
    /// - Any permission or device error; the pipeline is then `Failed` and
    ///   may be started again.
    ///
    /// Dropping the returned future before it resolves counts as a failed
    /// start: the state becomes `Failed(Cancelled)` and a device that was
    /// still opening is released once the open completes.
    pub async fn start(&self) -> Result<mpsc::Receiver<PitchReading>, CaptureError> {
        let (epoch, mut cancelled) = self.begin_start()?;
        let mut attempt = StartAttempt::new(self, epoch);
        log::info!("pipeline: requesting microphone access");

        let permission = tokio::select! {
            biased;
            _ = cancelled.changed() => return Err(CaptureError::Cancelled),
            result = self.source.request_permission() => result,
        };
        match permission {
            Ok(PermissionStatus::Granted) => {}
            Ok(PermissionStatus::Denied) => {
                return Err(self.fail(epoch, CaptureError::PermissionDenied))
            }
            Err(err) => return Err(self.fail(epoch, err)),
        }

        let (tx, rx) = mpsc::channel(self.delivery_capacity);
        let slot = Arc::new(LatestSlot::new());
        let gate = Arc::new(DeliveryGate::new(tx));
        let sink = self.intake(Arc::clone(&slot));
        attempt.slot = Some(Arc::clone(&slot));

        let ticket = Arc::new(OpenTicket::default());
        attempt.ticket = Some(Arc::clone(&ticket));
        let source = Arc::clone(&self.source);
        let mut opening = tokio::task::spawn_blocking(move || {
            let result = source.start(sink);
            if result.is_ok() && !ticket.complete() {
                log::debug!("pipeline: device opened after start was abandoned, releasing it");
                source.stop();
            }
            result
        });
        let joined = tokio::select! {
            biased;
            _ = cancelled.changed() => return Err(CaptureError::Cancelled),
            joined = &mut opening => joined,
        };
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(self.fail(epoch, err)),
            Err(e) => return Err(self.fail(epoch, CaptureError::EngineStart(e.to_string()))),
        }
        // The device is open and owned by this call from here on.
        attempt.ticket = None;

        let worker = Worker {
            estimator: Arc::clone(&self.estimator),
            mapper: self.mapper.clone(),
            range: self.range,
            throttle: self.throttle,
            stats: Arc::clone(&self.stats),
            gate: Arc::clone(&gate),
        };
        let session = Session {
            worker: tokio::spawn(worker.run(Arc::clone(&slot))),
            slot,
            gate,
        };

        if let Err(session) = self.install(epoch, session) {
            session.shutdown();
            self.source.stop();
            return Err(CaptureError::Cancelled);
        }
        attempt.disarm();

        match self.source.sample_rate() {
            Some(rate) => log::info!("pipeline: capturing at {rate} Hz"),
            None => log::info!("pipeline: capturing"),
        }
        Ok(rx)
    }

    /// Halt capture and estimation.
    ///
    /// Idempotent and never blocks on an in-flight estimation.  Once it
    /// returns no further reading is delivered; a pending `start()` resolves
    /// to [`CaptureError::Cancelled`].  A no-op before the first `start()`.
    pub fn stop(&self) {
        let session = {
            let mut inner = self.lock_inner();
            if matches!(inner.state, PipelineState::Idle | PipelineState::Stopped) {
                return;
            }
            self.epoch.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
            inner.state = PipelineState::Stopped;
            inner.session.take()
        };

        if let Some(session) = session {
            session.shutdown();
        }
        self.source.stop();
        log::info!("pipeline: stopped");
    }

    pub fn state(&self) -> PipelineState {
        self.lock_inner().state.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Subscribe to the visualization tap.  Updated for every captured
    /// buffer, including ones the throttle drops.
    pub fn amplitudes(&self) -> watch::Receiver<AmplitudeFrame> {
        self.amplitude.subscribe()
    }

    /// Sample rate of the current (or last) capture session.
    pub fn sample_rate(&self) -> Option<u32> {
        self.source.sample_rate()
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `AwaitingPermission` and snapshot the cancellation epoch.
    fn begin_start(&self) -> Result<(u64, watch::Receiver<u64>), CaptureError> {
        let mut inner = self.lock_inner();
        if inner.state.is_active() {
            return Err(CaptureError::AlreadyRunning);
        }
        inner.state = PipelineState::AwaitingPermission;
        Ok((*self.epoch.borrow(), self.epoch.subscribe()))
    }

    fn is_current(&self, epoch: u64) -> bool {
        *self.epoch.borrow() == epoch
    }

    /// Record a start failure, unless a `stop()` got there first.
    fn fail(&self, epoch: u64, err: CaptureError) -> CaptureError {
        let mut inner = self.lock_inner();
        if !self.is_current(epoch) {
            return CaptureError::Cancelled;
        }
        log::warn!("pipeline: start failed: {err}");
        inner.state = PipelineState::Failed(err.clone());
        err
    }

    fn install(&self, epoch: u64, session: Session) -> Result<(), Session> {
        let mut inner = self.lock_inner();
        if !self.is_current(epoch) {
            return Err(session);
        }
        inner.session = Some(session);
        inner.state = PipelineState::Capturing;
        Ok(())
    }

    /// Roll back a start whose future was dropped before it finished.
    fn abandon(&self, epoch: u64) {
        let mut inner = self.lock_inner();
        if self.is_current(epoch) && inner.state == PipelineState::AwaitingPermission {
            log::debug!("pipeline: start abandoned by caller");
            inner.state = PipelineState::Failed(CaptureError::Cancelled);
        }
    }

    /// The sink the source pushes into.  Runs on the audio thread.
    fn intake(&self, slot: Arc<LatestSlot<AudioBuffer>>) -> FrameSink {
        let stats = Arc::clone(&self.stats);
        let amplitude = Arc::clone(&self.amplitude);
        FrameSink::new(move |buffer: AudioBuffer| {
            if slot.is_closed() {
                return;
            }
            let frame = AmplitudeFrame::from_samples(buffer.samples());
            match slot.put(buffer) {
                Ok(displaced) => stats.record_received(displaced.is_some()),
                Err(_) => return,
            }
            amplitude.send_replace(frame);
        })
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
