//! Microphone capture via `cpal`.
//!
//! [`CpalSource`] implements [`AudioFrameSource`] on the system default
//! input device.  `cpal::Stream` is not `Send` on every platform, so each
//! session owns a dedicated `audio-capture` thread that builds the stream,
//! reports the outcome back to `start()`, and keeps the stream alive until
//! `stop()` signals it.  Dropping the stream on that thread releases the
//! device.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use super::framing::FrameAssembler;
use super::source::{AudioFrameSource, CaptureError, FrameSink, PermissionStatus};

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// Handle to the thread that owns a live `cpal::Stream`.
struct CaptureSession {
    /// Cleared by `stop()`; the data callback drops everything once unset.
    active: Arc<AtomicBool>,
    /// Sending (or dropping) this wakes the capture thread so it can drop
    /// the stream.
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Where the source is in its lifecycle.  `Starting` is published before
/// the device opens so `stop()` never has to wait for the open to finish.
enum SessionSlot {
    Idle,
    /// Holds the callback's `active` flag; `stop()` clears it and the
    /// opening `start()` tears the stream down when it sees that.
    Starting(Arc<AtomicBool>),
    Running(CaptureSession),
}

// ---------------------------------------------------------------------------
// CpalSource
// ---------------------------------------------------------------------------

/// [`AudioFrameSource`] backed by the default `cpal` input device.
///
/// # Example
///
/// ```rust,no_run
/// use pitch_tuner::audio::{AudioFrameSource, CpalSource, FrameSink};
///
/// let source = CpalSource::new(2048);
/// source
///     .start(FrameSink::new(|buffer| println!("{} frames", buffer.frame_count())))
///     .unwrap();
/// // ...
/// source.stop();
/// ```
pub struct CpalSource {
    buffer_size: usize,
    session: Mutex<SessionSlot>,
    /// Last negotiated sample rate; `0` until a start succeeds.
    sample_rate: AtomicU32,
}

impl CpalSource {
    /// Create a source that emits `buffer_size`-frame mono buffers.
    ///
    /// Nothing is opened until [`start`](AudioFrameSource::start).
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            session: Mutex::new(SessionSlot::Idle),
            sample_rate: AtomicU32::new(0),
        }
    }

    /// Frames per emitted buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionSlot> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AudioFrameSource for CpalSource {
    /// Desktop hosts have no separate permission prompt: access is decided
    /// when the stream opens, and a refusal surfaces from `start()`.  This
    /// only checks that a default input device exists.
    async fn request_permission(&self) -> Result<PermissionStatus, CaptureError> {
        let has_device =
            tokio::task::spawn_blocking(|| cpal::default_host().default_input_device().is_some())
                .await
                .map_err(|e| CaptureError::Permission(e.to_string()))?;

        if has_device {
            Ok(PermissionStatus::Granted)
        } else {
            Err(CaptureError::Permission(
                "no input device found on the default audio host".into(),
            ))
        }
    }

    fn start(&self, sink: FrameSink) -> Result<(), CaptureError> {
        let active = Arc::new(AtomicBool::new(true));
        {
            let mut slot = self.lock_session();
            if !matches!(*slot, SessionSlot::Idle) {
                return Err(CaptureError::AlreadyRunning);
            }
            *slot = SessionSlot::Starting(Arc::clone(&active));
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32, CaptureError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let buffer_size = self.buffer_size;
        let active_clone = Arc::clone(&active);
        let spawned = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match open_stream(buffer_size, sink, active_clone) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until stop() sends or drops the sender.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("audio-capture: stream released");
            });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                *self.lock_session() = SessionSlot::Idle;
                return Err(CaptureError::EngineStart(format!(
                    "failed to spawn capture thread: {e}"
                )));
            }
        };

        // Wait without holding the lock so stop() stays non-blocking.
        let outcome = ready_rx.recv();

        let mut slot = self.lock_session();
        match outcome {
            Ok(Ok(rate)) if active.load(Ordering::SeqCst) => {
                self.sample_rate.store(rate, Ordering::SeqCst);
                *slot = SessionSlot::Running(CaptureSession {
                    active,
                    stop_tx,
                    thread,
                });
                log::info!("audio capture started ({rate} Hz, {buffer_size} frames per buffer)");
                Ok(())
            }
            Ok(Ok(_)) => {
                drop(slot);
                log::debug!("audio capture stopped while the device was opening");
                let _ = stop_tx.send(());
                let _ = thread.join();
                *self.lock_session() = SessionSlot::Idle;
                Err(CaptureError::Cancelled)
            }
            Ok(Err(e)) => {
                *slot = SessionSlot::Idle;
                drop(slot);
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                *slot = SessionSlot::Idle;
                drop(slot);
                let _ = thread.join();
                Err(CaptureError::EngineStart(
                    "capture thread exited before the stream opened".into(),
                ))
            }
        }
    }

    fn stop(&self) {
        let session = {
            let mut slot = self.lock_session();
            match std::mem::replace(&mut *slot, SessionSlot::Idle) {
                SessionSlot::Idle => return,
                SessionSlot::Starting(active) => {
                    active.store(false, Ordering::SeqCst);
                    *slot = SessionSlot::Starting(active);
                    return;
                }
                SessionSlot::Running(session) => session,
            }
        };

        session.active.store(false, Ordering::SeqCst);
        let _ = session.stop_tx.send(());
        if session.thread.join().is_err() {
            log::warn!("audio-capture thread panicked during shutdown");
        }
        log::info!("audio capture stopped");
    }

    fn sample_rate(&self) -> Option<u32> {
        match self.sample_rate.load(Ordering::SeqCst) {
            0 => None,
            rate => Some(rate),
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Stream construction
// ---------------------------------------------------------------------------

/// Open and start the default input stream.  Runs on the capture thread.
fn open_stream(
    buffer_size: usize,
    sink: FrameSink,
    active: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or_else(|| {
        CaptureError::SessionConfig("no input device found on the default audio host".into())
    })?;

    if let Ok(name) = device.name() {
        log::info!("using audio input device: {name}");
    }

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::SessionConfig(e.to_string()))?;

    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let framer = FrameAssembler::new(buffer_size, channels, sample_rate);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, framer, sink, active),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, framer, sink, active),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, framer, sink, active),
        other => {
            return Err(CaptureError::SessionConfig(format!(
                "unsupported sample format {other:?}"
            )))
        }
    }
    .map_err(|e| CaptureError::SessionConfig(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::EngineStart(e.to_string()))?;

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut framer: FrameAssembler,
    sink: FrameSink,
    active: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if !active.load(Ordering::Acquire) {
                return;
            }
            let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
            for buffer in framer.push(&samples) {
                sink.push(buffer);
            }
        },
        |err: cpal::StreamError| {
            log::error!("cpal stream error: {err}");
        },
        None, // no timeout
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpal_source_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CpalSource>();
    }

    #[test]
    fn fresh_source_has_no_sample_rate() {
        let source = CpalSource::new(1024);
        assert_eq!(source.sample_rate(), None);
        assert_eq!(source.buffer_size(), 1024);
    }

    #[test]
    fn stop_while_opening_does_not_wait() {
        let source = CpalSource::new(1024);
        let active = Arc::new(AtomicBool::new(true));
        *source.lock_session() = SessionSlot::Starting(Arc::clone(&active));

        source.stop();
        assert!(!active.load(Ordering::SeqCst));
        assert!(matches!(*source.lock_session(), SessionSlot::Starting(_)));

        // The open still owns the slot until it finishes.
        assert_eq!(
            source.start(FrameSink::new(|_| {})),
            Err(CaptureError::AlreadyRunning)
        );
        *source.lock_session() = SessionSlot::Idle;
    }

    /// `stop()` without a session must not touch the audio host.
    #[test]
    fn stop_before_start_is_noop() {
        let source = CpalSource::new(1024);
        source.stop();
        source.stop();
        assert_eq!(source.sample_rate(), None);
    }
}
