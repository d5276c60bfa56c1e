//! Transport module - IO plumbing under the framing engines.
//!
//! Provides:
//! - Full-length read/write loops with transient-error retry
//! - The [`DatagramTransport`] abstraction (implemented for `UdpSocket`)
//! - [`CancelHandle`] for canceling a send between frames
//! - Worker-thread offload for encode/decode

mod cancel;
mod datagram;
mod io;
mod offload;

pub use cancel::CancelHandle;
pub use datagram::{recv_datagram, send_datagram, DatagramTransport};
pub use io::{recv_raw, send_frame, send_raw};
pub(crate) use offload::{decode, encode};
pub use offload::run_blocking;
