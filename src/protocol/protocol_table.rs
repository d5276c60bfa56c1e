//! Protocol table exchanged during version verification.
//!
//! Each peer builds one from its factory (reserved ids excluded) and sends it
//! in a `VersionVerification` frame. The receiver keeps the peer's table for
//! the rest of the session and consults it to resolve type ids the two sides
//! assigned differently.
//!
//! # Example
//!
//! ```
//! use nekoproto_channel::protocol::ProtocolTable;
//!
//! let mut table = ProtocolTable::new(0x010000);
//! table.insert(16, "Login");
//! table.insert(17, "Chat");
//!
//! let bytes = table.to_bytes().unwrap();
//! let decoded = ProtocolTable::from_bytes(&bytes).unwrap();
//! assert_eq!(decoded.name_of(17), Some("Chat"));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::{Codec, MsgPackCodec};
use crate::error::Result;
use crate::proto::{Message, PROTOCOL_TABLE_TYPE_ID};

/// Versioned map of type id to type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolTable {
    /// Packed factory version of the sender.
    pub protocol_factory_version: u32,
    /// Type id to type name.
    pub proto_table: BTreeMap<u32, String>,
}

impl ProtocolTable {
    /// Create an empty table.
    pub fn new(protocol_factory_version: u32) -> Self {
        Self {
            protocol_factory_version,
            proto_table: BTreeMap::new(),
        }
    }

    /// Create a table from an existing map.
    pub fn with_entries(protocol_factory_version: u32, proto_table: BTreeMap<u32, String>) -> Self {
        Self {
            protocol_factory_version,
            proto_table,
        }
    }

    /// Add an entry.
    pub fn insert(&mut self, type_id: u32, name: impl Into<String>) {
        self.proto_table.insert(type_id, name.into());
    }

    /// Name the sender registered for `type_id`.
    pub fn name_of(&self, type_id: i32) -> Option<&str> {
        let type_id = u32::try_from(type_id).ok()?;
        self.proto_table.get(&type_id).map(String::as_str)
    }

    /// Packed factory version of the sender.
    #[inline]
    pub fn version(&self) -> u32 {
        self.protocol_factory_version
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.proto_table.len()
    }

    /// Check if the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.proto_table.is_empty()
    }

    /// Encode as a message body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        MsgPackCodec::encode(self)
    }

    /// Decode from a message body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        MsgPackCodec::decode(bytes)
    }
}

impl Message for ProtocolTable {
    const NAME: &'static str = "ProtocolTable";
    const TYPE_ID: Option<i32> = Some(PROTOCOL_TABLE_TYPE_ID);
    type Codec = MsgPackCodec;
}
