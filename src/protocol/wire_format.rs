//! Wire format encoding and decoding.
//!
//! Implements the 10-byte message header:
//! ```text
//! ┌──────────┬──────────┬──────────────┐
//! │ Length   │ Data     │ Message Type │
//! │ 4 bytes  │ 4 bytes  │ 2 bytes      │
//! │ uint32 BE│ int32 BE │ uint16 BE    │
//! └──────────┴──────────┴──────────────┘
//! ```
//!
//! All fields are fixed-width Big Endian, independent of whatever codec the
//! message body uses. `length` never counts the header itself.
//!
//! | type | length | data |
//! |---|---|---|
//! | Complete | payload length | proto type id |
//! | Slice | slice length | offset in full payload |
//! | SliceHeader | total payload length | proto type id |
//! | Cancel | 0 | 0 or proto type id |
//! | VersionVerification | protocol table length | `ProtocolTable` type id |

use std::fmt;

use crate::error::{ChannelError, Result};

/// Header size in bytes (fixed, exactly 10).
pub const HEADER_SIZE: usize = 10;

/// Default size of one slice frame on the wire, header included.
pub const SLICE_SIZE: usize = 1200;

/// Default receive buffer for one datagram, header included.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Largest payload accepted for one datagram message.
///
/// This is the 16-bit UDP length minus the 8-byte UDP header, not minus
/// [`HEADER_SIZE`]. A frame carrying more than `MAX_DATAGRAM_SIZE - HEADER_SIZE`
/// (65525) payload bytes passes the send check but does not fit a default
/// receive buffer; in practice the IP layer already refuses datagrams that
/// large (65507 bytes of UDP payload over IPv4).
pub const MAX_DATAGRAM_PAYLOAD: usize = 65527;

/// Kind of frame announced by a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    /// Whole payload follows in one frame.
    Complete = 0,
    /// A sub-range of a payload announced by a `SliceHeader`.
    Slice = 1,
    /// Announces a sliced payload and its total size.
    SliceHeader = 2,
    /// Abandon the message in flight.
    Cancel = 3,
    /// Carries the sender's `ProtocolTable`.
    VersionVerification = 4,
}

impl MessageType {
    /// Wire value of this type.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for MessageType {
    type Error = ChannelError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(MessageType::Complete),
            1 => Ok(MessageType::Slice),
            2 => Ok(MessageType::SliceHeader),
            3 => Ok(MessageType::Cancel),
            4 => Ok(MessageType::VersionVerification),
            other => Err(ChannelError::InvalidMessageHeader(format!(
                "unknown message type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Complete => "Complete",
            MessageType::Slice => "Slice",
            MessageType::SliceHeader => "SliceHeader",
            MessageType::Cancel => "Cancel",
            MessageType::VersionVerification => "VersionVerification",
        };
        f.write_str(name)
    }
}

/// Decoded header from wire format.
///
/// `message_type` is kept as the raw wire value so that a header with an
/// unknown type still round-trips; use [`MessageHeader::kind`] to classify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Payload length in bytes (meaning depends on the type).
    pub length: u32,
    /// Proto type id or slice offset (meaning depends on the type).
    pub data: i32,
    /// Raw message type.
    pub message_type: u16,
}

impl MessageHeader {
    /// Create a new header.
    pub fn new(length: u32, data: i32, message_type: MessageType) -> Self {
        Self {
            length,
            data,
            message_type: message_type.as_u16(),
        }
    }

    /// Header of a whole message.
    #[inline]
    pub fn complete(length: u32, proto_type: i32) -> Self {
        Self::new(length, proto_type, MessageType::Complete)
    }

    /// Header announcing a sliced message.
    #[inline]
    pub fn slice_header(total: u32, proto_type: i32) -> Self {
        Self::new(total, proto_type, MessageType::SliceHeader)
    }

    /// Header of one slice.
    #[inline]
    pub fn slice(length: u32, offset: u32) -> Self {
        Self::new(length, offset as i32, MessageType::Slice)
    }

    /// Offset carried by a `Slice` header.
    ///
    /// `data` holds the offset as a u32 on the wire, so offsets past
    /// `i32::MAX` read back unchanged.
    #[inline]
    pub fn offset(&self) -> usize {
        self.data as u32 as usize
    }

    /// Cancel header, optionally naming the canceled proto type.
    #[inline]
    pub fn cancel(proto_type: i32) -> Self {
        Self::new(0, proto_type, MessageType::Cancel)
    }

    /// Header carrying a protocol table.
    #[inline]
    pub fn version_verification(length: u32, table_type: i32) -> Self {
        Self::new(length, table_type, MessageType::VersionVerification)
    }

    /// Classify the raw message type.
    ///
    /// Fails with `InvalidMessageHeader` for values outside `0..=4`.
    pub fn kind(&self) -> Result<MessageType> {
        MessageType::try_from(self.message_type)
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use nekoproto_channel::protocol::MessageHeader;
    ///
    /// let header = MessageHeader::complete(100, 16);
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [0, 0, 0, 100, 0, 0, 0, 16, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into the first 10 bytes of an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (10 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_be_bytes());
        buf[4..8].copy_from_slice(&self.data.to_be_bytes());
        buf[8..10].copy_from_slice(&self.message_type.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use nekoproto_channel::protocol::{MessageHeader, MessageType};
    ///
    /// let bytes = [0, 0, 4, 0xb0, 0, 0, 0, 0, 0, 1];
    /// let header = MessageHeader::decode(&bytes).unwrap();
    /// assert_eq!(header.length, 1200);
    /// assert_eq!(header.kind().unwrap(), MessageType::Slice);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            length: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            data: i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            message_type: u16::from_be_bytes([buf[8], buf[9]]),
        })
    }

    /// Decode, mapping a short buffer to `InvalidMessageHeader`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        Self::decode(buf).ok_or_else(|| {
            ChannelError::InvalidMessageHeader(format!(
                "need {} header bytes, got {}",
                HEADER_SIZE,
                buf.len()
            ))
        })
    }

    /// Check if this is a cancel frame.
    #[inline]
    pub fn is_cancel(&self) -> bool {
        self.message_type == MessageType::Cancel.as_u16()
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Ok(kind) => write!(
                f,
                "{} (length: {}, data: {})",
                kind, self.length, self.data
            ),
            Err(_) => write!(
                f,
                "type {} (length: {}, data: {})",
                self.message_type, self.length, self.data
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = MessageHeader::complete(100, 42);
        let encoded = original.encode();
        let decoded = MessageHeader::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = MessageHeader {
            length: 0x01020304,
            data: 0x05060708,
            message_type: 0x090A,
        };
        let bytes = header.encode();

        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A]);
    }

    #[test]
    fn test_negative_data_is_twos_complement() {
        let header = MessageHeader::cancel(-1);
        let bytes = header.encode();
        assert_eq!(&bytes[4..8], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(MessageHeader::decode(&bytes).unwrap().data, -1);
    }

    #[test]
    fn test_header_size_is_exactly_10() {
        assert_eq!(HEADER_SIZE, 10);
        assert_eq!(MessageHeader::default().encode().len(), 10);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 9];
        assert!(MessageHeader::decode(&buf).is_none());
        assert!(matches!(
            MessageHeader::parse(&buf),
            Err(ChannelError::InvalidMessageHeader(_))
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut buf = MessageHeader::slice(5, 1190).encode().to_vec();
        buf.extend_from_slice(b"hello");
        let header = MessageHeader::decode(&buf).unwrap();
        assert_eq!(header, MessageHeader::slice(5, 1190));
    }

    #[test]
    fn test_message_type_values() {
        assert_eq!(MessageType::Complete.as_u16(), 0);
        assert_eq!(MessageType::Slice.as_u16(), 1);
        assert_eq!(MessageType::SliceHeader.as_u16(), 2);
        assert_eq!(MessageType::Cancel.as_u16(), 3);
        assert_eq!(MessageType::VersionVerification.as_u16(), 4);
    }

    #[test]
    fn test_unknown_message_type() {
        let header = MessageHeader {
            length: 0,
            data: 0,
            message_type: 5,
        };
        assert!(matches!(
            header.kind(),
            Err(ChannelError::InvalidMessageHeader(_))
        ));
        assert_eq!(header.to_string(), "type 5 (length: 0, data: 0)");
    }

    #[test]
    fn test_constructors() {
        assert_eq!(MessageHeader::complete(3, 16).kind().unwrap(), MessageType::Complete);
        assert_eq!(MessageHeader::slice_header(3, 16).kind().unwrap(), MessageType::SliceHeader);
        assert_eq!(MessageHeader::slice(3, 0).kind().unwrap(), MessageType::Slice);
        assert!(MessageHeader::cancel(0).is_cancel());
        assert_eq!(
            MessageHeader::version_verification(9, 2).kind().unwrap(),
            MessageType::VersionVerification
        );
    }

    #[test]
    fn test_datagram_limits() {
        assert_eq!(MAX_DATAGRAM_SIZE, 65535);
        assert_eq!(MAX_DATAGRAM_PAYLOAD, 65527);
        assert_eq!(MAX_DATAGRAM_PAYLOAD, MAX_DATAGRAM_SIZE - 8);
        assert_eq!(MAX_DATAGRAM_SIZE - HEADER_SIZE, 65525);
    }

    #[test]
    fn test_slice_offset_past_i32_max() {
        let offset = 1u32 << 31;
        let header = MessageHeader::slice(100, offset);
        assert!(header.data < 0);
        assert_eq!(header.offset(), offset as usize);

        let decoded = MessageHeader::decode(&header.encode()).unwrap();
        assert_eq!(&header.encode()[4..8], &[0x80, 0, 0, 0]);
        assert_eq!(decoded.offset(), offset as usize);
        assert_eq!(MessageHeader::slice(5, u32::MAX).offset(), u32::MAX as usize);
    }

    proptest! {
        #[test]
        fn prop_header_roundtrip(length in any::<u32>(), data in any::<i32>(), message_type in 0u16..=4) {
            let header = MessageHeader { length, data, message_type };
            let decoded = MessageHeader::decode(&header.encode()).unwrap();
            prop_assert_eq!(decoded, header);
            prop_assert!(decoded.kind().is_ok());
        }

        #[test]
        fn prop_any_raw_type_roundtrips(length in any::<u32>(), data in any::<i32>(), message_type in any::<u16>()) {
            let header = MessageHeader { length, data, message_type };
            prop_assert_eq!(MessageHeader::decode(&header.encode()).unwrap(), header);
        }
    }
}
