//! Message capability traits and the built-in message wrappers.

use std::any::Any;
use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::RAW_DATA_TYPE_ID;
use crate::codec::Codec;
use crate::error::Result;

/// Object-safe capability of a framed message.
///
/// The framing engines only ever see `dyn Proto`: they ask for the wire type id,
/// encode with [`Proto::to_data`] and decode into an instance created by the
/// [`ProtoFactory`](super::ProtoFactory).
///
/// Most types implement [`Message`] instead and are wrapped in [`TypedProto`].
/// Implementing `Proto` by hand takes precedence and gives full control over
/// the payload format.
pub trait Proto: Send + Sync + fmt::Debug + 'static {
    /// Wire type id of this message.
    fn proto_type(&self) -> i32;

    /// Registered name of this message.
    fn name(&self) -> &str;

    /// Encode the message body.
    fn to_data(&self) -> Result<Vec<u8>>;

    /// Replace the message body with the decoded `data`.
    fn from_data(&mut self, data: &[u8]) -> Result<()>;

    /// Clone into a new box (used to encode on a worker thread).
    fn clone_box(&self) -> Box<dyn Proto>;

    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Owned upcast for downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl dyn Proto {
    /// Check if this is a `P`.
    #[inline]
    pub fn is<P: Proto>(&self) -> bool {
        self.as_any().is::<P>()
    }

    /// Borrow as a concrete proto implementation.
    #[inline]
    pub fn downcast_ref<P: Proto>(&self) -> Option<&P> {
        self.as_any().downcast_ref::<P>()
    }

    /// Borrow the typed value of a [`Message`].
    pub fn cast<T: Message>(&self) -> Option<&T> {
        self.downcast_ref::<TypedProto<T>>().map(|p| &p.value)
    }

    /// Mutably borrow the typed value of a [`Message`].
    pub fn cast_mut<T: Message>(&mut self) -> Option<&mut T> {
        self.as_any_mut()
            .downcast_mut::<TypedProto<T>>()
            .map(|p| &mut p.value)
    }

    /// Take the typed value out, or get the box back if it is another type.
    pub fn downcast<T: Message>(self: Box<Self>) -> std::result::Result<T, Box<dyn Proto>> {
        if !self.is::<TypedProto<T>>() {
            return Err(self);
        }
        match self.into_any().downcast::<TypedProto<T>>() {
            Ok(typed) => Ok(typed.value),
            Err(_) => unreachable!("type checked above"),
        }
    }
}

/// A serde value that can be framed.
///
/// The codec is chosen once per type through the associated `Codec`; fields
/// are written in declaration order by `#[derive(Serialize)]`.
pub trait Message:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + fmt::Debug + 'static
{
    /// Name shared with peers; must be unique within a factory.
    const NAME: &'static str;

    /// Fixed type id, for types whose id must not depend on registration order.
    const TYPE_ID: Option<i32> = None;

    /// Body codec.
    type Codec: Codec;
}

/// A [`Message`] value bound to its registered type id.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedProto<T: Message> {
    proto_type: i32,
    /// The message value.
    pub value: T,
}

impl<T: Message> TypedProto<T> {
    /// Bind `value` to `proto_type`.
    pub fn new(proto_type: i32, value: T) -> Self {
        Self { proto_type, value }
    }

    /// Unwrap the value.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Message> Proto for TypedProto<T> {
    fn proto_type(&self) -> i32 {
        self.proto_type
    }

    fn name(&self) -> &str {
        T::NAME
    }

    fn to_data(&self) -> Result<Vec<u8>> {
        T::Codec::encode(&self.value)
    }

    fn from_data(&mut self, data: &[u8]) -> Result<()> {
        self.value = T::Codec::decode(data)?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Proto> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Name reported by a placeholder whose type has no known name.
pub const RAW_DATA_NAME: &str = "RawData";

/// Placeholder for a message whose type id could not be resolved.
///
/// Carries the payload verbatim together with what the header declared.
/// Sending a `RawData` frames its bytes unchanged under `proto_type`, so it can
/// be forwarded to a peer that does know the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawData {
    /// Type id declared by the header.
    pub proto_type: i32,
    /// Payload length declared by the header.
    pub length: u32,
    /// Best-effort name from the negotiated protocol table.
    pub type_name: Option<String>,
    /// Raw payload bytes.
    pub data: Bytes,
}

impl RawData {
    /// Create a placeholder for `data` received under `proto_type`.
    pub fn new(proto_type: i32, type_name: Option<String>, data: Bytes) -> Self {
        Self {
            proto_type,
            length: data.len() as u32,
            type_name,
            data,
        }
    }
}

impl Default for RawData {
    fn default() -> Self {
        Self {
            proto_type: RAW_DATA_TYPE_ID,
            length: 0,
            type_name: None,
            data: Bytes::new(),
        }
    }
}

impl Proto for RawData {
    fn proto_type(&self) -> i32 {
        self.proto_type
    }

    fn name(&self) -> &str {
        self.type_name.as_deref().unwrap_or(RAW_DATA_NAME)
    }

    fn to_data(&self) -> Result<Vec<u8>> {
        Ok(self.data.to_vec())
    }

    fn from_data(&mut self, data: &[u8]) -> Result<()> {
        self.data = Bytes::copy_from_slice(data);
        self.length = data.len() as u32;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Proto> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
