//! Error types for nekoproto-channel.
//!
//! Every fallible operation of the framing engines returns [`Result`]. Framing
//! failures, size violations and transport failures all land in the single
//! closed [`ChannelError`] enum; [`ChannelError::code`] maps each variant to a
//! stable numeric [`ErrorCode`].

use std::fmt;

use thiserror::Error;

/// Main error type for all channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The 10-byte header could not be decoded or carries an unknown type.
    #[error("invalid message header: {0}")]
    InvalidMessageHeader(String),

    /// The header names a protocol type that is not registered.
    #[error("proto type {0} is not registered")]
    InvalidProtoType(i32),

    /// The payload could not be decoded into the resolved message.
    #[error("invalid proto data: {0}")]
    InvalidProtoData(String),

    /// The peer speaks a handshake this engine does not understand.
    #[error("proto version is not supported: {0}")]
    ProtoVersionUnsupported(String),

    /// A complete message arrived for a type that cannot be constructed.
    #[error("unrecognized message of proto type {0}")]
    UnrecognizedMessage(i32),

    /// No header arrived within the configured receive timeout.
    #[error("the operation timed out")]
    Timeout,

    /// Encoding the message produced no bytes.
    #[error("serializer returned no data")]
    NoData,

    /// The payload does not fit the transport's size limit.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Encoding a message or control payload failed.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The requested operation is not available on this transport.
    #[error("unsupported operation: {0}")]
    UnsupportOperator(&'static str),

    /// The peer closed the connection (zero-byte read or write).
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The operation was canceled, locally or by a `Cancel` frame.
    #[error("operation canceled")]
    Canceled,

    /// Unrecoverable I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Numeric code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ChannelError::InvalidMessageHeader(_) => ErrorCode::InvalidMessageHeader,
            ChannelError::InvalidProtoType(_) => ErrorCode::InvalidProtoType,
            ChannelError::InvalidProtoData(_) => ErrorCode::InvalidProtoData,
            ChannelError::ProtoVersionUnsupported(_) => ErrorCode::ProtoVersionUnsupported,
            ChannelError::UnrecognizedMessage(_) => ErrorCode::UnrecognizedMessage,
            ChannelError::Timeout => ErrorCode::Timeout,
            ChannelError::NoData => ErrorCode::NoData,
            ChannelError::MessageTooLarge { .. } => ErrorCode::MessageTooLarge,
            ChannelError::SerializationError(_) => ErrorCode::SerializationError,
            ChannelError::UnsupportOperator(_) => ErrorCode::UnsupportOperator,
            ChannelError::ConnectionReset => ErrorCode::ConnectionReset,
            ChannelError::Canceled => ErrorCode::Canceled,
            ChannelError::Io(_) => ErrorCode::Io,
        }
    }

    /// Whether this error signals a cancellation.
    #[inline]
    pub fn is_canceled(&self) -> bool {
        matches!(self, ChannelError::Canceled)
    }
}

impl From<rmp_serde::encode::Error> for ChannelError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ChannelError::SerializationError(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ChannelError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ChannelError::InvalidProtoData(err.to_string())
    }
}

/// Stable numeric codes for [`ChannelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    InvalidMessageHeader = 1,
    InvalidProtoType = 2,
    InvalidProtoData = 3,
    ProtoVersionUnsupported = 4,
    UnrecognizedMessage = 5,
    Timeout = 6,
    NoData = 7,
    MessageTooLarge = 8,
    SerializationError = 10,
    UnsupportOperator = 11,
    ConnectionReset = 12,
    Canceled = 13,
    Io = 14,
}

impl ErrorCode {
    /// Human-readable description of the code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::InvalidMessageHeader => "invalid message header",
            ErrorCode::InvalidProtoType => "proto type is not registered",
            ErrorCode::InvalidProtoData => "payload could not be decoded",
            ErrorCode::ProtoVersionUnsupported => "proto version is not supported",
            ErrorCode::UnrecognizedMessage => "unrecognized message type",
            ErrorCode::Timeout => "operation timed out",
            ErrorCode::NoData => "serializer produced no data",
            ErrorCode::MessageTooLarge => "message is too large",
            ErrorCode::SerializationError => "serialization failed",
            ErrorCode::UnsupportOperator => "operation is not supported by this transport",
            ErrorCode::ConnectionReset => "connection reset by peer",
            ErrorCode::Canceled => "operation canceled",
            ErrorCode::Io => "transport I/O error",
        }
    }

    /// Numeric value of the code.
    #[inline]
    pub fn value(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.value())
    }
}

/// Result type alias using ChannelError.
pub type Result<T> = std::result::Result<T, ChannelError>;
