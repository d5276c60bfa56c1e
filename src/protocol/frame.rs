//! Frame building helpers.
//!
//! A frame is one [`MessageHeader`] followed by `header.length` payload bytes.
//! A sliced message is one `SliceHeader` frame (no payload) followed by `Slice`
//! frames whose offsets are contiguous; [`SlicePlan`] computes those ranges.
//!
//! # Example
//!
//! ```
//! use nekoproto_channel::protocol::{build_frame, MessageHeader, HEADER_SIZE};
//!
//! let header = MessageHeader::complete(5, 16);
//! let bytes = build_frame(&header, b"hello");
//! assert_eq!(bytes.len(), HEADER_SIZE + 5);
//! ```

use super::wire_format::{MessageHeader, HEADER_SIZE};

/// Build a complete frame as a single byte vector.
///
/// Encodes header and appends payload into a contiguous buffer.
pub fn build_frame(header: &MessageHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Iterator over the `(offset, length)` ranges of a sliced payload.
///
/// Each slice frame occupies at most `slice_size` bytes on the wire, so each
/// chunk carries at most `slice_size - HEADER_SIZE` payload bytes.
///
/// ```
/// use nekoproto_channel::protocol::SlicePlan;
///
/// let ranges: Vec<_> = SlicePlan::new(1191, 1200).collect();
/// assert_eq!(ranges, vec![(0, 1190), (1190, 1)]);
/// ```
#[derive(Debug, Clone)]
pub struct SlicePlan {
    total: usize,
    chunk: usize,
    offset: usize,
}

impl SlicePlan {
    /// Plan slices for `total` payload bytes.
    ///
    /// `slice_size` is clamped so that every chunk carries at least one byte.
    pub fn new(total: usize, slice_size: usize) -> Self {
        Self {
            total,
            chunk: slice_size.saturating_sub(HEADER_SIZE).max(1),
            offset: 0,
        }
    }

    /// Payload bytes carried by a full slice.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk
    }

    /// Number of slices that remain.
    pub fn remaining(&self) -> usize {
        let left = self.total - self.offset;
        left.div_ceil(self.chunk)
    }
}

impl Iterator for SlicePlan {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.total {
            return None;
        }
        let len = (self.total - self.offset).min(self.chunk);
        let item = (self.offset, len);
        self.offset += len;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for SlicePlan {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SLICE_SIZE;

    #[test]
    fn test_build_frame() {
        let header = MessageHeader::complete(5, 16);
        let bytes = build_frame(&header, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        let parsed = MessageHeader::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_build_frame_empty_payload() {
        let header = MessageHeader::cancel(0);
        let bytes = build_frame(&header, b"");
        assert_eq!(bytes.len(), HEADER_SIZE);
    }

    #[test]
    fn test_exact_chunk_is_single_slice() {
        let chunk = SLICE_SIZE - HEADER_SIZE;
        let plan: Vec<_> = SlicePlan::new(chunk, SLICE_SIZE).collect();
        assert_eq!(plan, vec![(0, chunk)]);
    }

    #[test]
    fn test_one_byte_over_is_two_slices() {
        let chunk = SLICE_SIZE - HEADER_SIZE;
        let plan: Vec<_> = SlicePlan::new(chunk + 1, SLICE_SIZE).collect();
        assert_eq!(plan, vec![(0, chunk), (chunk, 1)]);
    }

    #[test]
    fn test_offsets_contiguous_and_increasing() {
        let total = 10 * 1024 + 17;
        let plan: Vec<_> = SlicePlan::new(total, SLICE_SIZE).collect();

        let mut expected = 0;
        for (offset, len) in &plan {
            assert_eq!(*offset, expected);
            assert!(*len > 0);
            expected = offset + len;
        }
        assert_eq!(expected, total);
        assert_eq!(plan.len(), total.div_ceil(SLICE_SIZE - HEADER_SIZE));
    }

    #[test]
    fn test_empty_plan() {
        let mut plan = SlicePlan::new(0, SLICE_SIZE);
        assert_eq!(plan.len(), 0);
        assert!(plan.next().is_none());
    }

    #[test]
    fn test_tiny_slice_size_is_clamped() {
        let plan = SlicePlan::new(3, 4);
        assert_eq!(plan.chunk_size(), 1);
        assert_eq!(plan.count(), 3);
    }

    #[test]
    fn test_size_hint_tracks_progress() {
        let mut plan = SlicePlan::new(2500, SLICE_SIZE);
        assert_eq!(plan.len(), 3);
        plan.next();
        assert_eq!(plan.len(), 2);
    }
}
