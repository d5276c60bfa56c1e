//! Codec module - value serializers for message bodies.
//!
//! A codec turns a whole message value into payload bytes and back. Each
//! registered message type picks exactly one codec through
//! [`Message::Codec`](crate::proto::Message::Codec):
//!
//! - [`MsgPackCodec`] - MessagePack via `rmp-serde` in struct-as-map form
//! - [`JsonCodec`] - JSON via `serde_json`
//!
//! Field order on the wire equals declaration order of the `#[derive(Serialize)]`
//! struct.
//!
//! # Design
//!
//! Codecs are marker structs; the [`Codec`] trait only carries associated
//! functions, so the backend is chosen at compile time per message type.
//!
//! # Example
//!
//! ```
//! use nekoproto_channel::codec::{Codec, JsonCodec, MsgPackCodec};
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//!
//! let json = JsonCodec::encode(&vec![1, 2, 3]).unwrap();
//! assert_eq!(json, b"[1,2,3]");
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serializer capability consumed by the framing engines.
pub trait Codec: Send + Sync + 'static {
    /// Short backend name.
    const NAME: &'static str;

    /// Encode a value into payload bytes.
    ///
    /// Failures map to [`ChannelError::SerializationError`](crate::ChannelError::SerializationError).
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>>;

    /// Decode payload bytes into a value.
    ///
    /// Failures map to [`ChannelError::InvalidProtoData`](crate::ChannelError::InvalidProtoData).
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}
