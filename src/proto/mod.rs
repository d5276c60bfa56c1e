//! Proto module - message capability and type registry.
//!
//! Provides:
//! - [`Proto`] - object-safe capability every framed message implements
//! - [`Message`] - serde-based shortcut; a `Message` is framed through [`TypedProto`]
//! - [`RawData`] - placeholder carrying the bytes of an unresolvable message
//! - [`ProtoFactory`] - maps type ids and names to constructible messages
//!
//! Type ids `1..=15` are reserved for framework messages and are never part of
//! a negotiated [`ProtocolTable`](crate::protocol::ProtocolTable).
//!
//! # Example
//!
//! ```
//! use nekoproto_channel::codec::MsgPackCodec;
//! use nekoproto_channel::proto::{Message, ProtoFactory};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
//! struct Chat {
//!     timestamp: u64,
//!     msg: String,
//! }
//!
//! impl Message for Chat {
//!     const NAME: &'static str = "Chat";
//!     type Codec = MsgPackCodec;
//! }
//!
//! let factory = ProtoFactory::builder(1, 0, 0).register::<Chat>().init();
//! let proto = factory.make(Chat { timestamp: 1, msg: "hi".into() }).unwrap();
//! assert_eq!(proto.name(), "Chat");
//! assert_eq!(proto.cast::<Chat>().unwrap().msg, "hi");
//! ```

mod factory;
mod message;

pub use factory::{Creator, ProtoFactory, ProtoFactoryBuilder};
pub use message::{Message, Proto, RawData, TypedProto, RAW_DATA_NAME};

/// Reserved id of the frame header itself (never constructible).
pub const MESSAGE_HEADER_TYPE_ID: i32 = 1;

/// Reserved id of the protocol table exchanged during version verification.
pub const PROTOCOL_TABLE_TYPE_ID: i32 = 2;

/// Reserved id of the raw-bytes placeholder.
pub const RAW_DATA_TYPE_ID: i32 = 3;

/// First id handed out to user message types.
pub const FIRST_USER_TYPE_ID: i32 = 16;

/// Check whether a type id lies in the reserved framework range.
#[inline]
pub fn is_reserved_type_id(type_id: i32) -> bool {
    (1..FIRST_USER_TYPE_ID).contains(&type_id)
}
