//! Thread-safe sequence counter for outbound frame headers.
//!
//! The header's `sequence` field is a 32-bit counter assigned by the sender.
//! Peers only use it for diagnostics (spotting gaps in a capture, matching log
//! lines on both ends), so it is not required to survive a reconnect.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU32` internally, so several tasks may call
//! [`SequenceCounter::next`] concurrently without a lock and without ever
//! receiving the same value twice.

use std::sync::atomic::{AtomicU32, Ordering};

/// A lock-free, monotonically increasing counter for frame sequence numbers.
///
/// Starts at 0 and wraps from `u32::MAX` back to 0 without panicking.
///
/// # Examples
///
/// ```rust
/// use simlink_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Returns the next sequence number and atomically increments the counter.
    ///
    /// `Ordering::Relaxed` is enough: the value orders frames, it does not
    /// publish any other memory.
    pub fn next(&self) -> u32 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the value the next call to [`next`](Self::next) will hand out.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
