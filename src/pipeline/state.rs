//! Pipeline lifecycle state and throughput counters.
//!
//! [`PipelineState`] is the lifecycle the presentation layer reads to decide
//! what to show (spinner, permission prompt, retry button, live reading).
//! [`PipelineStats`] counts what happened to the buffers; it is updated from
//! the audio callback and the worker without locking.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::CaptureError;

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// Lifecycle of a [`StreamPipeline`](super::StreamPipeline).
///
/// ```text
/// Idle ──start──▶ AwaitingPermission ──granted + device up──▶ Capturing
///                        │
///                        └──denied / device error──▶ Failed
///
/// any ──stop / drop──▶ Stopped
/// Failed / Stopped ──start──▶ AwaitingPermission
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PipelineState {
    /// Constructed, never started.
    #[default]
    Idle,

    /// `start()` is waiting for the host to answer the permission request
    /// or for the device to open.
    AwaitingPermission,

    /// Buffers are flowing.
    Capturing,

    /// `stop()` was called or the pipeline was dropped.
    Stopped,

    /// The last start attempt failed; only a new `start()` leaves this state.
    Failed(CaptureError),
}

impl PipelineState {
    /// `true` while a start is in progress or capture is running; `start()`
    /// is rejected in these states.
    ///
    /// ```
    /// use pitch_tuner::pipeline::PipelineState;
    ///
    /// assert!(!PipelineState::Idle.is_active());
    /// assert!(PipelineState::AwaitingPermission.is_active());
    /// assert!(PipelineState::Capturing.is_active());
    /// assert!(!PipelineState::Stopped.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PipelineState::AwaitingPermission | PipelineState::Capturing
        )
    }

    /// A short human-readable label suitable for a status line.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::AwaitingPermission => "Waiting for microphone",
            PipelineState::Capturing => "Listening",
            PipelineState::Stopped => "Stopped",
            PipelineState::Failed(_) => "Failed",
        }
    }

    /// The error behind a `Failed` state.
    pub fn failure(&self) -> Option<&CaptureError> {
        match self {
            PipelineState::Failed(err) => Some(err),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineStats
// ---------------------------------------------------------------------------

/// Lock-free buffer counters shared by the intake and the worker.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    overwritten: AtomicU64,
    estimated: AtomicU64,
    delivered: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Buffers accepted from the source.
    pub received: u64,
    /// Buffers replaced in the mailbox before the worker got to them.
    pub overwritten: u64,
    /// Estimator runs that completed.
    pub estimated: u64,
    /// Readings handed to the consumer.
    pub delivered: u64,
}

impl PipelineStats {
    pub(crate) fn record_received(&self, displaced: bool) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if displaced {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_estimated(&self) {
        self.estimated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            estimated: self.estimated.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(PipelineState::default(), PipelineState::Idle);
    }

    #[test]
    fn failed_is_not_active_and_keeps_reason() {
        let state = PipelineState::Failed(CaptureError::PermissionDenied);
        assert!(!state.is_active());
        assert_eq!(state.failure(), Some(&CaptureError::PermissionDenied));
        assert_eq!(PipelineState::Capturing.failure(), None);
    }

    #[test]
    fn labels() {
        assert_eq!(PipelineState::Idle.label(), "Idle");
        assert_eq!(
            PipelineState::AwaitingPermission.label(),
            "Waiting for microphone"
        );
        assert_eq!(PipelineState::Capturing.label(), "Listening");
        assert_eq!(PipelineState::Stopped.label(), "Stopped");
        assert_eq!(
            PipelineState::Failed(CaptureError::AlreadyRunning).label(),
            "Failed"
        );
    }

    #[test]
    fn stats_snapshot_counts() {
        let stats = PipelineStats::default();
        stats.record_received(false);
        stats.record_received(true);
        stats.record_received(true);
        stats.record_estimated();
        stats.record_delivered();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                received: 3,
                overwritten: 2,
                estimated: 1,
                delivered: 1,
            }
        );
    }
}
