//! Client tunables.
//!
//! ```
//! use std::time::Duration;
//! use nekoproto_channel::ChannelConfig;
//!
//! let config = ChannelConfig::new()
//!     .slice_size(4096)
//!     .max_payload_size(16 * 1024 * 1024)
//!     .recv_timeout(Duration::from_secs(5));
//! assert_eq!(config.slice_size, 4096);
//! ```

use std::time::Duration;

use crate::protocol::{HEADER_SIZE, MAX_DATAGRAM_SIZE, SLICE_SIZE};

/// Default sleep after a would-block or no-buffers error.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Configuration shared by the stream and datagram clients.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Size of one slice frame on the wire, header included.
    pub slice_size: usize,
    /// Largest stream payload sent, or declared by a received header.
    pub max_payload_size: u32,
    /// Bound on the idle wait for the first header of a new message.
    pub recv_timeout: Option<Duration>,
    /// Sleep applied before retrying a transient transport error.
    pub retry_backoff: Duration,
    /// Datagram receive buffer size.
    pub max_datagram_size: usize,
}

impl ChannelConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the slice frame size (clamped to at least one payload byte).
    pub fn slice_size(mut self, size: usize) -> Self {
        self.slice_size = size.max(HEADER_SIZE + 1);
        self
    }

    /// Set the maximum accepted payload size.
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the idle receive timeout.
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Set the transient-error backoff.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the datagram receive buffer size.
    pub fn max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size.max(HEADER_SIZE);
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            slice_size: SLICE_SIZE,
            max_payload_size: u32::MAX,
            recv_timeout: None,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}
