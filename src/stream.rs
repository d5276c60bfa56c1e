//! Stream framing engine.
//!
//! [`ProtoStreamClient`] maps one message to a sequence of header-prefixed
//! writes on a byte stream, and reassembles messages on receive.
//!
//! # Send
//!
//! ```text
//! [VersionVerification + table]?        (VERSION_VERIFICATION)
//! Complete(length, type) + payload      (default)
//! SliceHeader(total, type)              (SLICE_DATA)
//! Slice(len, offset) + chunk ...        offsets contiguous, chunk <= slice_size - 10
//! Cancel(type)                          only if canceled between slices
//! ```
//!
//! # Receive
//!
//! `recv` reads headers until one message is complete. Version tables are
//! absorbed into the session on the way. A `Cancel` frame fails the call with
//! `Canceled` and discards any partially assembled message.
//!
//! # Example
//!
//! ```ignore
//! let factory = ProtoFactory::builder(1, 0, 0).register::<Chat>().init();
//! let mut client = ProtoStreamClient::new(factory.clone(), tcp_stream);
//!
//! client
//!     .send_message(Chat { msg: "hi".into() }, StreamFlags::VERSION_VERIFICATION)
//!     .await?;
//! let reply = client.recv(StreamFlags::NONE).await?;
//! if let Some(chat) = reply.cast::<Chat>() {
//!     println!("{}", chat.msg);
//! }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::flags::StreamFlags;
use crate::proto::{Message, Proto, ProtoFactory, RawData, PROTOCOL_TABLE_TYPE_ID};
use crate::protocol::{
    MessageHeader, MessageType, ProtocolTable, SliceBuffer, SlicePlan, HEADER_SIZE,
};
use crate::transport::{self, recv_raw, send_frame, send_raw, CancelHandle};

/// Framing engine over a byte stream.
///
/// Not meant for concurrent `send`/`recv` from several callers; keep one send
/// loop and one receive loop per connection, or split the connection.
pub struct ProtoStreamClient<T> {
    transport: Option<T>,
    factory: Arc<ProtoFactory>,
    config: ChannelConfig,
    /// Last header read.
    header: MessageHeader,
    buffer: SliceBuffer,
    /// Instance the payload in flight decodes into.
    message: Option<Box<dyn Proto>>,
    /// Table received from the peer.
    peer_table: ProtocolTable,
    cancel: CancelHandle,
}

fn not_connected() -> ChannelError {
    ChannelError::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "stream client is closed",
    ))
}

fn connected<T>(transport: &mut Option<T>) -> Result<&mut T> {
    transport.as_mut().ok_or_else(not_connected)
}

impl<T> ProtoStreamClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a client with the default config.
    pub fn new(factory: Arc<ProtoFactory>, transport: T) -> Self {
        Self::with_config(factory, transport, ChannelConfig::default())
    }

    /// Create a client with a custom config.
    pub fn with_config(factory: Arc<ProtoFactory>, transport: T, config: ChannelConfig) -> Self {
        Self {
            transport: Some(transport),
            factory,
            buffer: SliceBuffer::with_max_payload(config.max_payload_size),
            config,
            header: MessageHeader::default(),
            message: None,
            peer_table: ProtocolTable::default(),
            cancel: CancelHandle::new(),
        }
    }

    /// Type registry used by this client.
    #[inline]
    pub fn factory(&self) -> &Arc<ProtoFactory> {
        &self.factory
    }

    /// Active configuration.
    #[inline]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Handle for canceling sends of this client.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Last header read from the transport.
    #[inline]
    pub fn last_header(&self) -> &MessageHeader {
        &self.header
    }

    /// Check if a transport is attached.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Borrow the transport.
    pub fn get_ref(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Mutably borrow the transport.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }

    /// Replace the negotiated peer table.
    pub fn set_proto_table(&mut self, version: u32, table: BTreeMap<u32, String>) {
        self.peer_table = ProtocolTable::with_entries(version, table);
    }

    /// Negotiated peer table.
    #[inline]
    pub fn proto_table(&self) -> &ProtocolTable {
        &self.peer_table
    }

    /// Swap in a new transport and return the old one.
    ///
    /// Any partially received message is discarded. With `reconnect` set the
    /// negotiated peer table is kept; otherwise it is cleared too.
    pub fn set_stream_client(&mut self, transport: T, reconnect: bool) -> Option<T> {
        let old = self.transport.replace(transport);
        self.reset_session();
        if !reconnect {
            self.peer_table = ProtocolTable::default();
            self.header = MessageHeader::default();
        }
        tracing::debug!("stream transport replaced (reconnect: {})", reconnect);
        old
    }

    /// Shut the transport down and detach it.
    pub async fn close(&mut self) -> Result<()> {
        self.reset_session();
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown().await?;
        }
        Ok(())
    }

    /// Detach the transport without shutting it down.
    pub fn into_inner(self) -> Option<T> {
        self.transport
    }

    /// Send the local protocol table.
    pub async fn send_version(&mut self) -> Result<()> {
        let table = self.factory.build_table();
        let payload = table.to_bytes()?;
        let header = MessageHeader::version_verification(payload.len() as u32, PROTOCOL_TABLE_TYPE_ID);

        let transport = connected(&mut self.transport)?;
        send_frame(transport, &header.encode(), &payload, self.config.retry_backoff).await?;
        tracing::debug!(
            "sent protocol table version {} with {} types",
            table.version(),
            table.len()
        );
        Ok(())
    }

    /// Wrap `value` with its registered type and send it.
    pub async fn send_message<M: Message>(&mut self, value: M, flags: StreamFlags) -> Result<()> {
        let message = self.factory.make(value)?;
        self.send(message.as_ref(), flags).await
    }

    /// Send one message.
    ///
    /// `RECV_UNKNOWN_TYPE_DATA` has no effect here.
    pub async fn send(&mut self, message: &dyn Proto, flags: StreamFlags) -> Result<()> {
        let result = self.send_inner(message, flags).await;
        if let Err(ref err) = result {
            tracing::warn!("send {} failed: {}", message.name(), err);
        }
        result
    }

    async fn send_inner(&mut self, message: &dyn Proto, flags: StreamFlags) -> Result<()> {
        let payload =
            transport::encode(message, flags.contains(StreamFlags::SERIALIZER_IN_THREAD)).await?;
        if payload.is_empty() {
            return Err(ChannelError::NoData);
        }
        let max = self.config.max_payload_size;
        let length = u32::try_from(payload.len())
            .ok()
            .filter(|length| *length <= max)
            .ok_or(ChannelError::MessageTooLarge {
                size: payload.len(),
                max: max as usize,
            })?;

        // Nothing has been written yet: a pending cancel drops the whole message.
        if self.cancel.take() {
            return Err(ChannelError::Canceled);
        }

        if flags.contains(StreamFlags::VERSION_VERIFICATION) {
            self.send_version().await?;
        }

        let proto_type = message.proto_type();
        if !flags.contains(StreamFlags::SLICE_DATA) {
            let header = MessageHeader::complete(length, proto_type);
            let transport = connected(&mut self.transport)?;
            send_frame(transport, &header.encode(), &payload, self.config.retry_backoff).await?;
            tracing::debug!("sent {}", header);
            self.drop_late_cancel(proto_type);
            return Ok(());
        }

        let result = self.send_slices(proto_type, length, &payload).await;
        if let Err(ref err) = result {
            if err.is_canceled() {
                self.send_cancel(proto_type).await;
            }
        }
        result
    }

    async fn send_slices(&mut self, proto_type: i32, length: u32, payload: &[u8]) -> Result<()> {
        let backoff = self.config.retry_backoff;
        let transport = connected(&mut self.transport)?;

        let header = MessageHeader::slice_header(length, proto_type);
        send_raw(transport, &header.encode(), backoff).await?;
        tracing::debug!("sent {}", header);

        let plan = SlicePlan::new(payload.len(), self.config.slice_size);
        let count = plan.len();
        for (index, (offset, len)) in plan.enumerate() {
            if index > 0 && self.cancel.take() {
                tracing::debug!("send canceled after {} of {} slices", index, count);
                return Err(ChannelError::Canceled);
            }
            let header = MessageHeader::slice(len as u32, offset as u32);
            send_frame(
                transport,
                &header.encode(),
                &payload[offset..offset + len],
                backoff,
            )
            .await?;
        }
        tracing::debug!("sent {} bytes of type {} in {} slices", length, proto_type, count);
        self.drop_late_cancel(proto_type);
        Ok(())
    }

    /// Consume a cancel request that arrived after the last frame was written.
    ///
    /// The message already reached the peer whole, so no `Cancel` frame follows
    /// and the request does not carry over to the next send.
    fn drop_late_cancel(&self, proto_type: i32) {
        if self.cancel.take() {
            tracing::debug!("cancel for proto type {} arrived after the last frame", proto_type);
        }
    }

    async fn send_cancel(&mut self, proto_type: i32) {
        let header = MessageHeader::cancel(proto_type);
        let backoff = self.config.retry_backoff;
        let sent = match self.transport.as_mut() {
            Some(transport) => send_raw(transport, &header.encode(), backoff).await,
            None => Err(not_connected()),
        };
        match sent {
            Ok(()) => tracing::warn!("sent cancel for proto type {}", proto_type),
            Err(err) => tracing::warn!("failed to send cancel for proto type {}: {}", proto_type, err),
        }
    }

    /// Receive one message.
    ///
    /// `SLICE_DATA` and `VERSION_VERIFICATION` have no effect here.
    pub async fn recv(&mut self, flags: StreamFlags) -> Result<Box<dyn Proto>> {
        if flags.contains(StreamFlags::SLICE_DATA) {
            tracing::warn!("SLICE_DATA is ignored on recv");
        }
        if flags.contains(StreamFlags::VERSION_VERIFICATION) {
            tracing::warn!("VERSION_VERIFICATION is ignored on recv");
        }

        let result = self.recv_inner(flags).await;
        if result.is_err() {
            self.reset_session();
        }
        result
    }

    async fn recv_inner(&mut self, flags: StreamFlags) -> Result<Box<dyn Proto>> {
        let backoff = self.config.retry_backoff;
        loop {
            let header = self.read_header().await?;
            self.header = header;
            tracing::debug!("recv {}", header);

            match header.kind()? {
                MessageType::Cancel => {
                    tracing::debug!("peer canceled proto type {}", header.data);
                    self.reset_session();
                    return Err(ChannelError::Canceled);
                }
                MessageType::VersionVerification => {
                    self.recv_version(&header).await?;
                }
                MessageType::Complete => {
                    let transport = connected(&mut self.transport)?;
                    let slot = self.buffer.prepare_complete(&header)?;
                    recv_raw(transport, slot, backoff).await?;
                    self.message = self.factory.resolve(header.data, &self.peer_table);
                    return self.finish(header.data, flags, false).await;
                }
                MessageType::SliceHeader => {
                    self.buffer.begin(&header)?;
                    self.message = self.factory.resolve(header.data, &self.peer_table);
                    if self.message.is_none() {
                        tracing::error!(
                            "slice header for unresolvable proto type {}, consuming {} bytes",
                            header.data,
                            header.length
                        );
                    }
                    if self.buffer.is_complete() {
                        return self.finish(header.data, flags, true).await;
                    }
                }
                MessageType::Slice => {
                    let transport = connected(&mut self.transport)?;
                    let slot = self.buffer.slot(&header)?;
                    recv_raw(transport, slot, backoff).await?;
                    if self.buffer.commit(header.length as usize) {
                        let proto_type = self.buffer.proto_type().unwrap_or_default();
                        return self.finish(proto_type, flags, true).await;
                    }
                }
            }
        }
    }

    /// Read one header, bounding only the idle wait for its first byte.
    async fn read_header(&mut self) -> Result<MessageHeader> {
        let backoff = self.config.retry_backoff;
        let idle = !self.buffer.is_assembling();
        let transport = connected(&mut self.transport)?;
        let mut bytes = [0u8; HEADER_SIZE];

        match self.config.recv_timeout {
            Some(limit) if idle => {
                tokio::time::timeout(limit, recv_raw(transport, &mut bytes[..1], backoff))
                    .await
                    .map_err(|_| ChannelError::Timeout)??;
                recv_raw(transport, &mut bytes[1..], backoff).await?;
            }
            _ => recv_raw(transport, &mut bytes, backoff).await?,
        }
        MessageHeader::parse(&bytes)
    }

    async fn recv_version(&mut self, header: &MessageHeader) -> Result<()> {
        if header.data != PROTOCOL_TABLE_TYPE_ID {
            return Err(ChannelError::ProtoVersionUnsupported(format!(
                "legacy version header (data {}, length {})",
                header.data, header.length
            )));
        }
        let transport = connected(&mut self.transport)?;
        let slot = self.buffer.prepare_complete(header)?;
        recv_raw(transport, slot, self.config.retry_backoff).await?;

        let table = ProtocolTable::from_bytes(self.buffer.payload())?;
        self.buffer.finish();
        if table.version() != self.factory.version() {
            tracing::warn!(
                "protocol factory version mismatch: local {}, peer {}",
                self.factory.version(),
                table.version()
            );
        }
        tracing::debug!("received protocol table with {} types", table.len());
        self.peer_table = table;
        Ok(())
    }

    /// Decode the assembled payload into the resolved instance.
    async fn finish(
        &mut self,
        proto_type: i32,
        flags: StreamFlags,
        sliced: bool,
    ) -> Result<Box<dyn Proto>> {
        let payload = self.buffer.take_payload();
        let Some(message) = self.message.take() else {
            if flags.contains(StreamFlags::RECV_UNKNOWN_TYPE_DATA) {
                let name = self.peer_table.name_of(proto_type).map(str::to_string);
                return Ok(Box::new(RawData::new(proto_type, name, Bytes::from(payload))));
            }
            self.buffer.recycle(payload);
            tracing::error!("received message of unresolvable proto type {}", proto_type);
            return Err(if sliced {
                ChannelError::InvalidProtoType(proto_type)
            } else {
                ChannelError::UnrecognizedMessage(proto_type)
            });
        };

        let in_thread = flags.contains(StreamFlags::SERIALIZER_IN_THREAD);
        let (result, payload) = transport::decode(message, payload, in_thread).await;
        if let Some(payload) = payload {
            self.buffer.recycle(payload);
        }
        result
    }

    fn reset_session(&mut self) {
        self.buffer.clear();
        self.message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, MsgPackCodec};
    use crate::protocol::build_frame;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Chat {
        timestamp: u64,
        msg: String,
        numbers: Vec<i32>,
    }

    impl Message for Chat {
        const NAME: &'static str = "Chat";
        type Codec = MsgPackCodec;
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Login {
        user: String,
    }

    impl Message for Login {
        const NAME: &'static str = "Login";
        type Codec = MsgPackCodec;
    }

    fn chat(len: usize) -> Chat {
        Chat {
            timestamp: 1_700_000_000,
            msg: "x".repeat(len),
            numbers: vec![1, 2, 3],
        }
    }

    fn factory() -> Arc<ProtoFactory> {
        ProtoFactory::builder(1, 0, 0)
            .register::<Chat>()
            .register::<Login>()
            .init()
    }

    fn pair() -> (ProtoStreamClient<DuplexStream>, ProtoStreamClient<DuplexStream>) {
        let (a, b) = duplex(1 << 20);
        (
            ProtoStreamClient::new(factory(), a),
            ProtoStreamClient::new(factory(), b),
        )
    }

    #[tokio::test]
    async fn test_complete_roundtrip() {
        let (mut a, mut b) = pair();
        a.send_message(chat(5), StreamFlags::NONE).await.unwrap();

        let received = b.recv(StreamFlags::NONE).await.unwrap();
        assert_eq!(received.name(), "Chat");
        assert_eq!(received.cast::<Chat>().unwrap(), &chat(5));
        assert_eq!(b.last_header().kind().unwrap(), MessageType::Complete);
    }

    #[tokio::test]
    async fn test_wire_layout_of_complete_frame() {
        let (client, mut raw) = duplex(1024);
        let mut a = ProtoStreamClient::new(factory(), client);
        let login = Login {
            user: "neko".to_string(),
        };
        a.send_message(login.clone(), StreamFlags::NONE).await.unwrap();

        let body = MsgPackCodec::encode(&login).unwrap();
        let mut bytes = vec![0u8; HEADER_SIZE + body.len()];
        raw.read_exact(&mut bytes).await.unwrap();

        let header = MessageHeader::decode(&bytes).unwrap();
        assert_eq!(header, MessageHeader::complete(body.len() as u32, 17));
        assert_eq!(&bytes[HEADER_SIZE..], &body[..]);
    }

    #[tokio::test]
    async fn test_sliced_equals_unsliced() {
        let (mut a, mut b) = pair();
        let message = chat(10_000);

        a.send_message(message.clone(), StreamFlags::SLICE_DATA)
            .await
            .unwrap();
        a.send_message(message.clone(), StreamFlags::NONE).await.unwrap();

        let sliced = b.recv(StreamFlags::NONE).await.unwrap();
        assert_eq!(b.last_header().kind().unwrap(), MessageType::Slice);
        let whole = b.recv(StreamFlags::NONE).await.unwrap();

        assert_eq!(sliced.cast::<Chat>().unwrap(), &message);
        assert_eq!(sliced.to_data().unwrap(), whole.to_data().unwrap());
    }

    #[tokio::test]
    async fn test_slice_frames_on_the_wire() {
        let (client, mut raw) = duplex(1 << 20);
        let mut a = ProtoStreamClient::new(factory(), client);
        let message = chat(3000);
        let body = MsgPackCodec::encode(&message).unwrap();
        a.send_message(message, StreamFlags::SLICE_DATA).await.unwrap();

        let mut head = [0u8; HEADER_SIZE];
        raw.read_exact(&mut head).await.unwrap();
        let slice_header = MessageHeader::decode(&head).unwrap();
        assert_eq!(slice_header, MessageHeader::slice_header(body.len() as u32, 16));

        let mut offset = 0usize;
        while offset < body.len() {
            raw.read_exact(&mut head).await.unwrap();
            let header = MessageHeader::decode(&head).unwrap();
            assert_eq!(header.kind().unwrap(), MessageType::Slice);
            assert_eq!(header.data as usize, offset);
            assert!(header.length as usize <= SLICE_SIZE_PAYLOAD);

            let mut chunk = vec![0u8; header.length as usize];
            raw.read_exact(&mut chunk).await.unwrap();
            assert_eq!(&chunk[..], &body[offset..offset + chunk.len()]);
            offset += chunk.len();
        }
        assert_eq!(offset, body.len());
    }

    const SLICE_SIZE_PAYLOAD: usize = crate::protocol::SLICE_SIZE - HEADER_SIZE;

    #[tokio::test]
    async fn test_version_handshake_exchanges_tables() {
        let (mut a, mut b) = pair();
        a.send_message(chat(1), StreamFlags::VERSION_VERIFICATION)
            .await
            .unwrap();
        b.recv(StreamFlags::NONE).await.unwrap();
        assert_eq!(b.proto_table(), &a.factory().build_table());

        b.send_message(Login::default(), StreamFlags::VERSION_VERIFICATION)
            .await
            .unwrap();
        a.recv(StreamFlags::NONE).await.unwrap();
        assert_eq!(a.proto_table().name_of(16), Some("Chat"));
        assert_eq!(a.proto_table().name_of(17), Some("Login"));
        assert_eq!(a.proto_table().len(), 2);
    }

    #[tokio::test]
    async fn test_ids_reconciled_by_name() {
        let (left, right) = duplex(1 << 16);
        let reversed = ProtoFactory::builder(1, 1, 0)
            .register::<Login>()
            .register::<Chat>()
            .init();
        let mut a = ProtoStreamClient::new(factory(), left);
        let mut b = ProtoStreamClient::new(reversed, right);

        a.send_message(chat(4), StreamFlags::VERSION_VERIFICATION)
            .await
            .unwrap();
        let received = b.recv(StreamFlags::NONE).await.unwrap();
        assert_eq!(received.proto_type(), 17);
        assert_eq!(received.cast::<Chat>().unwrap(), &chat(4));
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let (left, right) = duplex(1 << 16);
        let mut a = ProtoStreamClient::new(factory(), left);
        let mut b = ProtoStreamClient::new(ProtoFactory::builder(1, 0, 0).init(), right);

        a.send_message(chat(2), StreamFlags::NONE).await.unwrap();
        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::UnrecognizedMessage(16))));

        a.send_message(chat(2), StreamFlags::VERSION_VERIFICATION)
            .await
            .unwrap();
        let raw = b.recv(StreamFlags::RECV_UNKNOWN_TYPE_DATA).await.unwrap();
        let raw = raw.downcast_ref::<RawData>().unwrap();
        let body = MsgPackCodec::encode(&chat(2)).unwrap();
        assert_eq!(raw.proto_type, 16);
        assert_eq!(raw.length as usize, body.len());
        assert_eq!(raw.type_name.as_deref(), Some("Chat"));
        assert_eq!(&raw.data[..], &body[..]);
    }

    #[tokio::test]
    async fn test_unknown_sliced_type_keeps_stream_aligned() {
        let (left, right) = duplex(1 << 16);
        let mut a = ProtoStreamClient::new(factory(), left);
        let only_chat = ProtoFactory::builder(1, 0, 0).register::<Chat>().init();
        let mut b = ProtoStreamClient::new(only_chat, right);

        a.send_message(Login::default(), StreamFlags::SLICE_DATA)
            .await
            .unwrap();
        a.send_message(chat(3), StreamFlags::NONE).await.unwrap();

        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::InvalidProtoType(17))));
        let next = b.recv(StreamFlags::NONE).await.unwrap();
        assert_eq!(next.cast::<Chat>().unwrap(), &chat(3));
    }

    #[tokio::test]
    async fn test_cancel_frame_resets_assembly() {
        let (client, mut raw) = duplex(1 << 16);
        let mut b = ProtoStreamClient::new(factory(), client);

        let mut bytes = MessageHeader::slice_header(2000, 16).encode().to_vec();
        bytes.extend(build_frame(&MessageHeader::slice(1190, 0), &[0u8; 1190]));
        bytes.extend(MessageHeader::cancel(16).encode());
        raw.write_all(&bytes).await.unwrap();

        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::Canceled)));

        let body = MsgPackCodec::encode(&chat(1)).unwrap();
        raw.write_all(&build_frame(&MessageHeader::complete(body.len() as u32, 16), &body))
            .await
            .unwrap();
        let received = b.recv(StreamFlags::NONE).await.unwrap();
        assert_eq!(received.cast::<Chat>().unwrap(), &chat(1));
    }

    #[tokio::test]
    async fn test_cancel_before_send_writes_nothing() {
        let (mut a, mut b) = pair();
        a.cancel_handle().cancel();
        let result = a.send_message(chat(1), StreamFlags::SLICE_DATA).await;
        assert!(matches!(result, Err(ChannelError::Canceled)));

        a.send_message(chat(2), StreamFlags::NONE).await.unwrap();
        let received = b.recv(StreamFlags::NONE).await.unwrap();
        assert_eq!(received.cast::<Chat>().unwrap(), &chat(2));
    }

    #[tokio::test]
    async fn test_cancel_between_slices_sends_cancel_frame() {
        let (client, mut raw) = duplex(2000);
        let mut a = ProtoStreamClient::new(factory(), client);
        let handle = a.cancel_handle();

        let sender = tokio::spawn(async move {
            let result = a.send_message(chat(5000), StreamFlags::SLICE_DATA).await;
            (a, result)
        });

        let mut head = [0u8; HEADER_SIZE];
        raw.read_exact(&mut head).await.unwrap();
        assert_eq!(
            MessageHeader::decode(&head).unwrap().kind().unwrap(),
            MessageType::SliceHeader
        );

        let mut slices = 0;
        loop {
            raw.read_exact(&mut head).await.unwrap();
            let header = MessageHeader::decode(&head).unwrap();
            if header.is_cancel() {
                assert_eq!(header.data, 16);
                break;
            }
            let mut chunk = vec![0u8; header.length as usize];
            raw.read_exact(&mut chunk).await.unwrap();
            slices += 1;
            if slices == 1 {
                handle.cancel();
            }
        }

        let (_, result) = sender.await.unwrap();
        assert!(matches!(result, Err(ChannelError::Canceled)));
        assert!(slices >= 1 && slices < 5);
    }

    #[tokio::test]
    async fn test_cancel_during_last_slice_ends_with_that_send() {
        let (client, mut raw) = duplex(16);
        let mut a = ProtoStreamClient::new(factory(), client);
        let handle = a.cancel_handle();

        let sender = tokio::spawn(async move {
            let result = a.send_message(chat(100), StreamFlags::SLICE_DATA).await;
            (a, result)
        });

        let mut head = [0u8; HEADER_SIZE];
        raw.read_exact(&mut head).await.unwrap();
        assert_eq!(
            MessageHeader::decode(&head).unwrap().kind().unwrap(),
            MessageType::SliceHeader
        );
        handle.cancel();

        raw.read_exact(&mut head).await.unwrap();
        let slice = MessageHeader::decode(&head).unwrap();
        assert_eq!(slice.kind().unwrap(), MessageType::Slice);
        let mut chunk = vec![0u8; slice.length as usize];
        raw.read_exact(&mut chunk).await.unwrap();

        let (mut a, result) = sender.await.unwrap();
        assert!(result.is_ok());
        assert!(!handle.is_requested());

        let mut b = ProtoStreamClient::new(factory(), raw);
        let (sent, received) = tokio::join!(
            a.send_message(chat(1), StreamFlags::NONE),
            b.recv(StreamFlags::NONE)
        );
        sent.unwrap();
        assert_eq!(received.unwrap().cast::<Chat>().unwrap(), &chat(1));
    }

    #[tokio::test]
    async fn test_no_data() {
        let (mut a, _b) = pair();
        let empty = RawData::new(16, None, Bytes::new());
        let result = a.send(&empty, StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::NoData)));
    }

    #[tokio::test]
    async fn test_declared_size_over_limit() {
        let (client, mut raw) = duplex(1024);
        let config = ChannelConfig::new().max_payload_size(100);
        let mut b = ProtoStreamClient::with_config(factory(), client, config);

        raw.write_all(&MessageHeader::complete(1000, 16).encode())
            .await
            .unwrap();
        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(
            result,
            Err(ChannelError::MessageTooLarge { size: 1000, max: 100 })
        ));
    }

    #[tokio::test]
    async fn test_oversize_send_writes_nothing() {
        let (client, mut raw) = duplex(1 << 16);
        let body = MsgPackCodec::encode(&chat(100)).unwrap();
        let config = ChannelConfig::new().max_payload_size(body.len() as u32 - 1);
        let mut a = ProtoStreamClient::with_config(factory(), client, config);

        for flags in [
            StreamFlags::NONE,
            StreamFlags::SLICE_DATA | StreamFlags::VERSION_VERIFICATION,
        ] {
            let result = a.send_message(chat(100), flags).await;
            assert!(matches!(
                result,
                Err(ChannelError::MessageTooLarge { size, max })
                    if size == body.len() && max == body.len() - 1
            ));
        }

        drop(a);
        let mut written = Vec::new();
        raw.read_to_end(&mut written).await.unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn test_send_at_payload_limit() {
        let (mut a, mut b) = pair();
        let body = MsgPackCodec::encode(&chat(100)).unwrap();
        a.config = ChannelConfig::new().max_payload_size(body.len() as u32);

        a.send_message(chat(100), StreamFlags::NONE).await.unwrap();
        let received = b.recv(StreamFlags::NONE).await.unwrap();
        assert_eq!(received.cast::<Chat>().unwrap(), &chat(100));
    }

    #[tokio::test]
    async fn test_slice_out_of_bounds() {
        let (client, mut raw) = duplex(1024);
        let mut b = ProtoStreamClient::new(factory(), client);

        let mut bytes = MessageHeader::slice_header(100, 16).encode().to_vec();
        bytes.extend(MessageHeader::slice(10, 95).encode());
        raw.write_all(&bytes).await.unwrap();

        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::InvalidProtoData(_))));
    }

    #[tokio::test]
    async fn test_unknown_message_type() {
        let (client, mut raw) = duplex(1024);
        let mut b = ProtoStreamClient::new(factory(), client);
        let header = MessageHeader {
            length: 0,
            data: 0,
            message_type: 9,
        };
        raw.write_all(&header.encode()).await.unwrap();

        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::InvalidMessageHeader(_))));
    }

    #[tokio::test]
    async fn test_legacy_version_header_rejected() {
        let (client, mut raw) = duplex(1024);
        let mut b = ProtoStreamClient::new(factory(), client);
        let legacy = MessageHeader::version_verification(0, 65536);
        raw.write_all(&legacy.encode()).await.unwrap();

        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::ProtoVersionUnsupported(_))));
    }

    #[tokio::test]
    async fn test_bad_payload_is_invalid_data() {
        let (client, mut raw) = duplex(1024);
        let mut b = ProtoStreamClient::new(factory(), client);
        raw.write_all(&build_frame(&MessageHeader::complete(2, 16), &[0xc1, 0xc1]))
            .await
            .unwrap();

        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::InvalidProtoData(_))));
    }

    #[tokio::test]
    async fn test_recv_timeout() {
        let (client, _raw) = duplex(1024);
        let config = ChannelConfig::new().recv_timeout(Duration::from_millis(20));
        let mut b = ProtoStreamClient::with_config(factory(), client, config);

        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::Timeout)));
    }

    #[tokio::test]
    async fn test_serializer_in_thread() {
        let (mut a, mut b) = pair();
        let flags = StreamFlags::SERIALIZER_IN_THREAD | StreamFlags::SLICE_DATA;
        a.send_message(chat(4000), flags).await.unwrap();

        let received = b.recv(StreamFlags::SERIALIZER_IN_THREAD).await.unwrap();
        assert_eq!(received.cast::<Chat>().unwrap(), &chat(4000));
    }

    #[tokio::test]
    async fn test_set_stream_client() {
        let (mut a, _b) = pair();
        a.set_proto_table(7, BTreeMap::from([(16, "Chat".to_string())]));

        let (c, _d) = duplex(64);
        assert!(a.set_stream_client(c, true).is_some());
        assert_eq!(a.proto_table().version(), 7);

        let (e, _f) = duplex(64);
        a.set_stream_client(e, false);
        assert!(a.proto_table().is_empty());
    }

    #[tokio::test]
    async fn test_closed_client() {
        let (mut a, mut b) = pair();
        a.close().await.unwrap();
        assert!(!a.is_connected());

        let result = a.send_message(chat(1), StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::Io(_))));

        let result = b.recv(StreamFlags::NONE).await;
        assert!(matches!(result, Err(ChannelError::ConnectionReset)));
    }
}
