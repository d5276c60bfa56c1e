//! Protocol module - wire format, framing, and the protocol table.
//!
//! This module implements the binary framing shared by both clients:
//! - 10-byte header encoding/decoding
//! - Slice planning for the send side
//! - Slice reassembly buffer for the receive side
//! - Protocol table carried by version verification

mod frame;
mod protocol_table;
mod slice_buffer;
mod wire_format;

pub use frame::{build_frame, SlicePlan};
pub use protocol_table::ProtocolTable;
pub use slice_buffer::SliceBuffer;
pub use wire_format::{
    MessageHeader, MessageType, HEADER_SIZE, MAX_DATAGRAM_PAYLOAD, MAX_DATAGRAM_SIZE, SLICE_SIZE,
};
