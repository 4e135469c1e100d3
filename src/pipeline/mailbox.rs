//! Single-slot "latest value" mailbox between the audio callback and the
//! estimation worker.
//!
//! The producer never waits: [`LatestSlot::put`] replaces whatever is waiting
//! and hands the displaced value back so the caller can count the drop.  The
//! consumer takes the newest value or waits for one.  Overwrite and take
//! happen under the same mutex, so a value is either taken or displaced,
//! never both.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

struct SlotInner<T> {
    value: Option<T>,
    closed: bool,
}

/// Bounded-to-one mailbox with overwrite-on-put semantics.
///
/// # Example
///
/// ```rust
/// use pitch_tuner::pipeline::LatestSlot;
///
/// let slot = LatestSlot::new();
/// assert_eq!(slot.put(1), Ok(None));
/// assert_eq!(slot.put(2), Ok(Some(1))); // 1 is dropped, never delivered
/// assert_eq!(slot.take(), Some(2));
///
/// slot.close();
/// assert_eq!(slot.put(3), Err(3));
/// ```
pub struct LatestSlot<T> {
    inner: Mutex<SlotInner<T>>,
    notify: Notify,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                value: None,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `value`, replacing any waiting one.
    ///
    /// Returns the displaced value, or gives `value` back as `Err` once the
    /// slot is closed.
    pub fn put(&self, value: T) -> Result<Option<T>, T> {
        let displaced = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(value);
            }
            inner.value.replace(value)
        };
        self.notify.notify_one();
        Ok(displaced)
    }

    /// Take the waiting value without blocking.
    pub fn take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Wait for the next value.  Returns `None` once the slot is closed.
    ///
    /// Meant for a single consumer.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if let Some(value) = inner.value.take() {
                    return Some(value);
                }
            }
            notified.await;
        }
    }

    /// Refuse further puts, drop the waiting value and wake the consumer.
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
            inner.value = None;
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
