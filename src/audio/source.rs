//! The capture contract the pipeline is written against.
//!
//! [`AudioFrameSource`] is object-safe and `Send + Sync` so the pipeline can
//! hold it behind an `Arc<dyn AudioFrameSource>`.  [`CpalSource`] is the
//! production implementation; [`MockSource`] (available under `#[cfg(test)]`)
//! lets pipeline tests drive buffers by hand, including after `stop()`.
//!
//! [`CpalSource`]: crate::audio::CpalSource

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioBuffer
// ---------------------------------------------------------------------------

/// One fixed-size block of mono PCM as captured from the input device.
///
/// Immutable once built: the pipeline moves it into whichever stage is
/// processing it and drops it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap mono `samples` captured at `sample_rate` Hz.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Mono samples, nominally in `[-1.0, 1.0]`.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of frames (equal to the number of samples, since the buffer is
    /// mono).
    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    /// Sample rate valid at capture time, in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Wall-clock span covered by the buffer.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

// ---------------------------------------------------------------------------
// PermissionStatus / CaptureError
// ---------------------------------------------------------------------------

/// Outcome of a microphone permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Reasons a capture session could not be started.
///
/// Per-buffer outcomes (no pitch found, pitch out of range) are not errors
/// and never appear here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or OS refused microphone access.
    #[error("microphone access was denied")]
    PermissionDenied,

    /// The permission request itself failed before an answer came back.
    #[error("microphone permission request failed: {0}")]
    Permission(String),

    /// The capture session (device, stream configuration) could not be set up.
    #[error("failed to configure the capture session: {0}")]
    SessionConfig(String),

    /// The device was configured but refused to start streaming.
    #[error("audio device failed to start: {0}")]
    EngineStart(String),

    /// `start()` was called while a session is already starting or running.
    #[error("capture is already running")]
    AlreadyRunning,

    /// `stop()` was called while `start()` was still in progress.
    #[error("capture start was cancelled")]
    Cancelled,
}

impl CaptureError {
    /// `true` when the user has to grant access outside the app before
    /// another attempt can succeed.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, CaptureError::PermissionDenied)
    }

    /// `true` when simply calling `start()` again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::Permission(_)
                | CaptureError::SessionConfig(_)
                | CaptureError::EngineStart(_)
                | CaptureError::Cancelled
        )
    }
}

// ---------------------------------------------------------------------------
// FrameSink
// ---------------------------------------------------------------------------

/// Where a running source pushes its buffers.
///
/// Cheap to clone.  `push` never blocks for longer than a short critical
/// section, so it is safe to call from a real-time audio callback.
#[derive(Clone)]
pub struct FrameSink {
    deliver: Arc<dyn Fn(AudioBuffer) + Send + Sync>,
}

impl FrameSink {
    pub fn new(deliver: impl Fn(AudioBuffer) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Hand one buffer to the pipeline.
    pub fn push(&self, buffer: AudioBuffer) {
        (self.deliver)(buffer);
    }
}

impl fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSink").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// AudioFrameSource trait
// ---------------------------------------------------------------------------

/// A stoppable producer of mono [`AudioBuffer`]s.
///
/// # Contract
///
/// - [`request_permission`](Self::request_permission) is awaited once per
///   start attempt, before [`start`](Self::start).
/// - `start` must not push any buffer before it has returned `Ok`, and every
///   buffer of one session carries the same sample rate.
/// - `start` on a running source returns [`CaptureError::AlreadyRunning`];
///   after [`stop`](Self::stop) it may be called again.
/// - `stop` is idempotent, safe in any state, and once it returns the source
///   pushes nothing more into the sink it was started with.
#[async_trait]
pub trait AudioFrameSource: Send + Sync {
    /// Ask the host for microphone access.
    async fn request_permission(&self) -> Result<PermissionStatus, CaptureError>;

    /// Open the device and start pushing buffers into `sink`.
    ///
    /// May block while the device opens; async callers should run it on the
    /// blocking pool.
    fn start(&self, sink: FrameSink) -> Result<(), CaptureError>;

    /// Halt buffer emission and release the device.
    fn stop(&self);

    /// Sample rate of the current (or last) session, `None` before the first
    /// successful `start`.
    fn sample_rate(&self) -> Option<u32>;
}

// Compile-time assertion: Box<dyn AudioFrameSource> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AudioFrameSource>) {}
};

// ---------------------------------------------------------------------------
// MockSource (test double)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockSource;

#[cfg(test)]
mod mock {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Condvar, Mutex};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::{AudioBuffer, AudioFrameSource, CaptureError, FrameSink, PermissionStatus};

    /// Hand-driven source for pipeline tests.
    ///
    /// The sink it was last started with is kept even after `stop()`, so
    /// [`inject`](Self::inject) can model a device callback that fires late.
    pub struct MockSource {
        sample_rate: u32,
        permission: Result<PermissionStatus, CaptureError>,
        start_error: Mutex<Option<CaptureError>>,
        permission_gate: Option<Arc<Notify>>,
        start_gate: Option<(Mutex<bool>, Condvar)>,
        opening: AtomicBool,
        sink: Mutex<Option<FrameSink>>,
        running: AtomicBool,
        pub starts: AtomicUsize,
        pub stops: AtomicUsize,
    }

    impl MockSource {
        pub fn granted(sample_rate: u32) -> Self {
            Self {
                sample_rate,
                permission: Ok(PermissionStatus::Granted),
                start_error: Mutex::new(None),
                permission_gate: None,
                start_gate: None,
                opening: AtomicBool::new(false),
                sink: Mutex::new(None),
                running: AtomicBool::new(false),
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            }
        }

        pub fn denied() -> Self {
            Self {
                permission: Ok(PermissionStatus::Denied),
                ..Self::granted(44_100)
            }
        }

        pub fn permission_error(err: CaptureError) -> Self {
            Self {
                permission: Err(err),
                ..Self::granted(44_100)
            }
        }

        /// Make the next `start()` fail with `err`.
        pub fn fail_next_start(&self, err: CaptureError) {
            *self.start_error.lock().unwrap() = Some(err);
        }

        /// `request_permission` waits until `gate` is notified.
        pub fn with_permission_gate(mut self, gate: Arc<Notify>) -> Self {
            self.permission_gate = Some(gate);
            self
        }

        /// `start` blocks, as a slow device open would, until
        /// [`open_start_gate`](Self::open_start_gate) is called.
        pub fn with_start_gate(mut self) -> Self {
            self.start_gate = Some((Mutex::new(false), Condvar::new()));
            self
        }

        pub fn open_start_gate(&self) {
            if let Some((open, cv)) = &self.start_gate {
                *open.lock().unwrap() = true;
                cv.notify_all();
            }
        }

        /// `true` while a `start` call is held at the start gate.
        pub fn is_opening(&self) -> bool {
            self.opening.load(Ordering::SeqCst)
        }

        pub fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        /// Push `samples` into the last sink, whether or not the source is
        /// still running.  Returns `false` if `start` was never called.
        pub fn inject(&self, samples: Vec<f32>) -> bool {
            let sink = self.sink.lock().unwrap().clone();
            match sink {
                Some(sink) => {
                    sink.push(AudioBuffer::new(samples, self.sample_rate));
                    true
                }
                None => false,
            }
        }
    }

    #[async_trait]
    impl AudioFrameSource for MockSource {
        async fn request_permission(&self) -> Result<PermissionStatus, CaptureError> {
            if let Some(gate) = &self.permission_gate {
                gate.notified().await;
            }
            self.permission.clone()
        }

        fn start(&self, sink: FrameSink) -> Result<(), CaptureError> {
            if let Some((open, cv)) = &self.start_gate {
                self.opening.store(true, Ordering::SeqCst);
                let mut open = open.lock().unwrap();
                while !*open {
                    open = cv.wait(open).unwrap();
                }
                self.opening.store(false, Ordering::SeqCst);
            }
            if let Some(err) = self.start_error.lock().unwrap().take() {
                return Err(err);
            }
            if self.running.swap(true, Ordering::SeqCst) {
                return Err(CaptureError::AlreadyRunning);
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
        }

        fn sample_rate(&self) -> Option<u32> {
            (self.starts.load(Ordering::SeqCst) > 0).then_some(self.sample_rate)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
