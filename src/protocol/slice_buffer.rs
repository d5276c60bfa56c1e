//! Receive-side payload buffer and slice reassembly state.
//!
//! The buffer is reused across messages and grows to the declared payload
//! size. It is a small state machine:
//! - `Idle`: no message in flight; a `Complete` payload may be read directly
//! - `Assembling`: a `SliceHeader` announced `total` bytes; `Slice` frames fill
//!   `buffer[offset..offset + length]` until `received == total`
//!
//! Every declared size is checked against `max_payload_size` before the buffer
//! is resized, and every slice range is bounds-checked, so a hostile header
//! yields an error instead of an allocation or a panic.

use std::ops::Range;

use super::wire_format::MessageHeader;
use crate::error::{ChannelError, Result};

/// Byte range of a `Slice` frame within a payload of `total` bytes.
fn slice_range(header: &MessageHeader, total: usize) -> Result<Range<usize>> {
    let offset = header.offset();
    let length = header.length as usize;
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(offset..end),
        _ => Err(ChannelError::InvalidProtoData(format!(
            "slice offset {} length {} exceeds payload size {}",
            offset, length, total
        ))),
    }
}

/// State machine for slice reassembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No sliced message in flight.
    Idle,
    /// Slice header seen, waiting for slices.
    Assembling { proto_type: i32, total: usize },
}

/// Payload buffer shared by the `Complete` and `Slice` receive paths.
#[derive(Debug)]
pub struct SliceBuffer {
    /// Payload bytes of the message in flight.
    buffer: Vec<u8>,
    /// Current assembly state.
    state: State,
    /// Slice bytes received so far.
    received: usize,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl SliceBuffer {
    /// Create a buffer accepting payloads up to `max_payload_size` bytes.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: Vec::new(),
            state: State::Idle,
            received: 0,
            max_payload_size,
        }
    }

    fn check_size(&self, length: u32) -> Result<usize> {
        if length > self.max_payload_size {
            return Err(ChannelError::MessageTooLarge {
                size: length as usize,
                max: self.max_payload_size as usize,
            });
        }
        Ok(length as usize)
    }

    /// Prepare the buffer for a `Complete` payload and return it for filling.
    ///
    /// Fails with `InvalidMessageHeader` if a sliced message is in flight.
    pub fn prepare_complete(&mut self, header: &MessageHeader) -> Result<&mut [u8]> {
        if let State::Assembling { .. } = self.state {
            return Err(ChannelError::InvalidMessageHeader(
                "complete message received while a sliced message is in flight".to_string(),
            ));
        }
        let length = self.check_size(header.length)?;
        self.buffer.clear();
        self.buffer.resize(length, 0);
        Ok(&mut self.buffer[..])
    }

    /// Start assembling the message announced by a `SliceHeader`.
    pub fn begin(&mut self, header: &MessageHeader) -> Result<()> {
        if let State::Assembling { .. } = self.state {
            return Err(ChannelError::InvalidMessageHeader(
                "slice header received while a sliced message is in flight".to_string(),
            ));
        }
        let total = self.check_size(header.length)?;
        self.buffer.clear();
        self.buffer.resize(total, 0);
        self.received = 0;
        self.state = State::Assembling {
            proto_type: header.data,
            total,
        };
        Ok(())
    }

    /// Region of the buffer a `Slice` frame's bytes go into.
    ///
    /// Fails with `InvalidMessageHeader` when no slice header preceded the slice
    /// and with `InvalidProtoData` when the range leaves the announced payload.
    pub fn slot(&mut self, header: &MessageHeader) -> Result<&mut [u8]> {
        let State::Assembling { total, .. } = self.state else {
            return Err(ChannelError::InvalidMessageHeader(
                "slice received without a slice header".to_string(),
            ));
        };
        let range = slice_range(header, total)?;
        Ok(&mut self.buffer[range])
    }

    /// Account for `length` slice bytes just written into a slot.
    ///
    /// Returns `true` once the whole announced payload has been received.
    pub fn commit(&mut self, length: usize) -> bool {
        self.received += length;
        self.is_complete()
    }

    /// Whether the sliced message in flight has been fully received.
    pub fn is_complete(&self) -> bool {
        match self.state {
            State::Assembling { total, .. } => self.received >= total,
            State::Idle => false,
        }
    }

    /// Whether a sliced message is in flight.
    #[inline]
    pub fn is_assembling(&self) -> bool {
        matches!(self.state, State::Assembling { .. })
    }

    /// Proto type announced by the slice header in flight.
    pub fn proto_type(&self) -> Option<i32> {
        match self.state {
            State::Assembling { proto_type, .. } => Some(proto_type),
            State::Idle => None,
        }
    }

    /// Slice bytes received so far.
    #[inline]
    pub fn received(&self) -> usize {
        self.received
    }

    /// Payload bytes of the current message.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Mark the current message as consumed, keeping the allocation.
    pub fn finish(&mut self) {
        self.state = State::Idle;
        self.received = 0;
    }

    /// Move the payload out (e.g. to a worker thread).
    ///
    /// Hand the vector back through [`SliceBuffer::recycle`] to keep reusing it.
    pub fn take_payload(&mut self) -> Vec<u8> {
        self.finish();
        std::mem::take(&mut self.buffer)
    }

    /// Return a vector previously taken with [`SliceBuffer::take_payload`].
    pub fn recycle(&mut self, mut buffer: Vec<u8>) {
        buffer.clear();
        self.buffer = buffer;
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.finish();
    }
}
