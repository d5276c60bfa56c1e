//! Per-call behavior flags for `send` and `recv`.
//!
//! | flag | send | recv |
//! |---|---|---|
//! | `SERIALIZER_IN_THREAD` | encode on a blocking worker | decode on a blocking worker |
//! | `SLICE_DATA` | split into `SliceHeader` + `Slice` frames | ignored (warned) |
//! | `VERSION_VERIFICATION` | send the protocol table first | ignored (warned) |
//! | `RECV_UNKNOWN_TYPE_DATA` | ignored | return [`RawData`](crate::proto::RawData) for unknown types |

use bitflags::bitflags;

bitflags! {
    /// Bitmask of per-call options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamFlags: u32 {
        /// Run encode/decode on a worker thread.
        const SERIALIZER_IN_THREAD = 1;
        /// Split the payload into slices (stream send only).
        const SLICE_DATA = 1 << 1;
        /// Send the local protocol table before the message (send only).
        const VERSION_VERIFICATION = 1 << 2;
        /// Return a raw placeholder for unresolvable types (recv only).
        const RECV_UNKNOWN_TYPE_DATA = 1 << 3;
    }
}

impl StreamFlags {
    /// No options.
    pub const NONE: StreamFlags = StreamFlags::empty();
}
