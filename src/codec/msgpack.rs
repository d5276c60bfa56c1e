//! MsgPack codec using `rmp-serde`.
//!
//! Always `to_vec_named`: structs go on the wire as maps keyed by field name,
//! never as positional arrays.
//!
//! # Example
//!
//! ```
//! use nekoproto_channel::codec::{Codec, MsgPackCodec};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Chat {
//!     timestamp: u64,
//!     msg: String,
//! }
//!
//! let chat = Chat { timestamp: 42, msg: "hello".to_string() };
//! let encoded = MsgPackCodec::encode(&chat).unwrap();
//! let decoded: Chat = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, chat);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Codec;
use crate::error::Result;

/// MessagePack codec, the default body codec and the codec of `ProtocolTable`.
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    const NAME: &'static str = "msgpack";

    #[inline]
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
