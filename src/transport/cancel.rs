//! Cooperative cancellation of a send in progress.
//!
//! A request is only observed between frames, never in the middle of a write,
//! so the peer never sees a torn frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle for canceling the next (or current) send.
///
/// ```
/// use nekoproto_channel::transport::CancelHandle;
///
/// let handle = CancelHandle::new();
/// let remote = handle.clone();
/// remote.cancel();
/// assert!(handle.take());
/// assert!(!handle.is_requested());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    requested: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create a handle with no pending request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Check for a pending request without consuming it.
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Consume a pending request.
    ///
    /// Returns `true` if one was pending.
    #[inline]
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }

    /// Drop a pending request.
    pub fn reset(&self) {
        self.requested.store(false, Ordering::Release);
    }
}
