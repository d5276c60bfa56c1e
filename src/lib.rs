//! # nekoproto-channel
//!
//! Type-tagged, length-prefixed message framing over async byte streams and
//! datagram sockets.
//!
//! Every frame starts with a fixed 10-byte big-endian header naming the payload
//! length, the message type id and the frame kind. On top of that:
//!
//! - **Slicing**: large stream messages can be split into bounded `Slice`
//!   frames behind one `SliceHeader`
//! - **Version handshake**: peers exchange a [`ProtocolTable`] so that type ids
//!   assigned in a different order are resolved by name
//! - **Cancellation**: a sliced send can be abandoned between frames with a
//!   `Cancel` frame the receiver understands
//!
//! ## Example
//!
//! ```ignore
//! use nekoproto_channel::codec::MsgPackCodec;
//! use nekoproto_channel::proto::{Message, ProtoFactory};
//! use nekoproto_channel::{ProtoStreamClient, StreamFlags};
//!
//! #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
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
//! #[tokio::main]
//! async fn main() -> nekoproto_channel::Result<()> {
//!     let factory = ProtoFactory::builder(1, 0, 0).register::<Chat>().init();
//!     let stream = tokio::net::TcpStream::connect("127.0.0.1:9000").await?;
//!     let mut client = ProtoStreamClient::new(factory, stream);
//!
//!     let chat = Chat { timestamp: 1, msg: "hello".into() };
//!     client
//!         .send_message(chat, StreamFlags::VERSION_VERIFICATION | StreamFlags::SLICE_DATA)
//!         .await?;
//!
//!     let reply = client.recv(StreamFlags::NONE).await?;
//!     println!("{:?}", reply.cast::<Chat>());
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod datagram;
pub mod error;
pub mod flags;
pub mod proto;
pub mod protocol;
pub mod stream;
pub mod transport;

pub use config::ChannelConfig;
pub use datagram::ProtoDatagramClient;
pub use error::{ChannelError, ErrorCode, Result};
pub use flags::StreamFlags;
pub use proto::{Message, Proto, ProtoFactory, RawData};
pub use protocol::{MessageHeader, MessageType, ProtocolTable};
pub use stream::ProtoStreamClient;
pub use transport::{CancelHandle, DatagramTransport};
