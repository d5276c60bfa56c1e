//! Datagram framing engine.
//!
//! [`ProtoDatagramClient`] uses the same 10-byte header as the stream engine,
//! restricted to whole-datagram messages: every datagram is one header plus
//! its entire payload. Slicing is not available since datagrams may be lost
//! or reordered; only `Complete` and `VersionVerification` frames are valid.
//!
//! ```ignore
//! let socket = UdpSocket::bind("0.0.0.0:9000").await?;
//! let mut client = ProtoDatagramClient::new(factory, socket);
//!
//! let (message, peer) = client.recv(StreamFlags::NONE).await?;
//! client.send(message.as_ref(), peer, StreamFlags::NONE).await?;
//! ```

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::flags::StreamFlags;
use crate::proto::{Message, Proto, ProtoFactory, RawData, PROTOCOL_TABLE_TYPE_ID};
use crate::protocol::{
    build_frame, MessageHeader, MessageType, ProtocolTable, HEADER_SIZE, MAX_DATAGRAM_PAYLOAD,
};
use crate::transport::{self, recv_datagram, send_datagram, DatagramTransport};

/// Framing engine over a datagram socket.
pub struct ProtoDatagramClient<T> {
    transport: Option<T>,
    factory: Arc<ProtoFactory>,
    config: ChannelConfig,
    /// Last header read.
    header: MessageHeader,
    /// Receive buffer, sized to `max_datagram_size` on first use.
    buffer: Vec<u8>,
    /// Table received from the most recent handshake.
    peer_table: ProtocolTable,
}

fn not_connected() -> ChannelError {
    ChannelError::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "datagram client is closed",
    ))
}

impl<T: DatagramTransport> ProtoDatagramClient<T> {
    /// Create a client with the default config.
    pub fn new(factory: Arc<ProtoFactory>, transport: T) -> Self {
        Self::with_config(factory, transport, ChannelConfig::default())
    }

    /// Create a client with a custom config.
    pub fn with_config(factory: Arc<ProtoFactory>, transport: T, config: ChannelConfig) -> Self {
        Self {
            transport: Some(transport),
            factory,
            config,
            header: MessageHeader::default(),
            buffer: Vec::new(),
            peer_table: ProtocolTable::default(),
        }
    }

    #[inline]
    pub fn factory(&self) -> &Arc<ProtoFactory> {
        &self.factory
    }

    #[inline]
    pub fn last_header(&self) -> &MessageHeader {
        &self.header
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn get_ref(&self) -> Option<&T> {
        self.transport.as_ref()
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

    /// Detach and drop the socket.
    pub fn close(&mut self) {
        self.transport = None;
        self.buffer = Vec::new();
    }

    /// Send the local protocol table to `target`.
    pub async fn send_version(&mut self, target: SocketAddr) -> Result<()> {
        let table = self.factory.build_table();
        let payload = table.to_bytes()?;
        let header =
            MessageHeader::version_verification(payload.len() as u32, PROTOCOL_TABLE_TYPE_ID);
        self.send_datagram_frame(&header, &payload, target).await?;
        tracing::debug!("sent protocol table version {} to {}", table.version(), target);
        Ok(())
    }

    /// Wrap `value` with its registered type and send it to `target`.
    pub async fn send_message<M: Message>(
        &mut self,
        value: M,
        target: SocketAddr,
        flags: StreamFlags,
    ) -> Result<()> {
        let message = self.factory.make(value)?;
        self.send(message.as_ref(), target, flags).await
    }

    /// Send one message as a single datagram.
    ///
    /// Fails with `UnsupportOperator` when `SLICE_DATA` is set and with
    /// `MessageTooLarge` when the payload exceeds 65527 bytes; nothing is sent
    /// in either case.
    pub async fn send(
        &mut self,
        message: &dyn Proto,
        target: SocketAddr,
        flags: StreamFlags,
    ) -> Result<()> {
        if flags.contains(StreamFlags::SLICE_DATA) {
            return Err(ChannelError::UnsupportOperator(
                "slice data is not supported on datagram transports",
            ));
        }
        let payload =
            transport::encode(message, flags.contains(StreamFlags::SERIALIZER_IN_THREAD)).await?;
        if payload.is_empty() {
            return Err(ChannelError::NoData);
        }
        if payload.len() > MAX_DATAGRAM_PAYLOAD {
            return Err(ChannelError::MessageTooLarge {
                size: payload.len(),
                max: MAX_DATAGRAM_PAYLOAD,
            });
        }

        if flags.contains(StreamFlags::VERSION_VERIFICATION) {
            self.send_version(target).await?;
        }

        let header = MessageHeader::complete(payload.len() as u32, message.proto_type());
        self.send_datagram_frame(&header, &payload, target).await?;
        tracing::debug!("sent {} to {}", header, target);
        Ok(())
    }

    async fn send_datagram_frame(
        &mut self,
        header: &MessageHeader,
        payload: &[u8],
        target: SocketAddr,
    ) -> Result<()> {
        let transport = self.transport.as_ref().ok_or_else(not_connected)?;
        let frame = build_frame(header, payload);
        let sent = send_datagram(transport, &frame, target, self.config.retry_backoff).await?;
        if sent != frame.len() {
            return Err(ChannelError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated: sent {} of {} bytes", sent, frame.len()),
            )));
        }
        Ok(())
    }

    /// Receive one message and the address it came from.
    ///
    /// Version tables are absorbed on the way. `SLICE_DATA` and
    /// `VERSION_VERIFICATION` have no effect here.
    pub async fn recv(&mut self, flags: StreamFlags) -> Result<(Box<dyn Proto>, SocketAddr)> {
        if flags.contains(StreamFlags::SLICE_DATA) {
            tracing::warn!("SLICE_DATA is ignored on recv");
        }
        if flags.contains(StreamFlags::VERSION_VERIFICATION) {
            tracing::warn!("VERSION_VERIFICATION is ignored on recv");
        }

        loop {
            let (len, peer) = self.recv_one().await?;
            let header = MessageHeader::parse(&self.buffer[..len])?;
            self.header = header;
            tracing::debug!("recv {} from {}", header, peer);

            let payload = &self.buffer[HEADER_SIZE..len];
            if header.length as usize != payload.len() {
                return Err(ChannelError::InvalidMessageHeader(format!(
                    "header declares {} bytes, datagram carries {}",
                    header.length,
                    payload.len()
                )));
            }
            if header.length > self.config.max_payload_size {
                return Err(ChannelError::MessageTooLarge {
                    size: header.length as usize,
                    max: self.config.max_payload_size as usize,
                });
            }

            match header.kind()? {
                MessageType::VersionVerification => {
                    self.absorb_table(&header, len)?;
                }
                MessageType::Complete => {
                    let message = self.decode(&header, len, flags).await?;
                    return Ok((message, peer));
                }
                other => {
                    return Err(ChannelError::InvalidMessageHeader(format!(
                        "{} frames are not valid on datagram transports",
                        other
                    )));
                }
            }
        }
    }

    async fn recv_one(&mut self) -> Result<(usize, SocketAddr)> {
        let transport = self.transport.as_ref().ok_or_else(not_connected)?;
        if self.buffer.len() != self.config.max_datagram_size {
            self.buffer.resize(self.config.max_datagram_size, 0);
        }

        let backoff = self.config.retry_backoff;
        let received = match self.config.recv_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, recv_datagram(transport, &mut self.buffer, backoff))
                    .await
                    .map_err(|_| ChannelError::Timeout)??
            }
            None => recv_datagram(transport, &mut self.buffer, backoff).await?,
        };
        if received.0 < HEADER_SIZE {
            return Err(ChannelError::InvalidMessageHeader(format!(
                "datagram of {} bytes is shorter than a header",
                received.0
            )));
        }
        Ok(received)
    }

    fn absorb_table(&mut self, header: &MessageHeader, len: usize) -> Result<()> {
        if header.data != PROTOCOL_TABLE_TYPE_ID {
            return Err(ChannelError::ProtoVersionUnsupported(format!(
                "legacy version header (data {}, length {})",
                header.data, header.length
            )));
        }
        let table = ProtocolTable::from_bytes(&self.buffer[HEADER_SIZE..len])?;
        if table.version() != self.factory.version() {
            tracing::warn!(
                "protocol factory version mismatch: local {}, peer {}",
                self.factory.version(),
                table.version()
            );
        }
        self.peer_table = table;
        Ok(())
    }

    async fn decode(
        &self,
        header: &MessageHeader,
        len: usize,
        flags: StreamFlags,
    ) -> Result<Box<dyn Proto>> {
        let payload = &self.buffer[HEADER_SIZE..len];
        let Some(mut message) = self.factory.resolve(header.data, &self.peer_table) else {
            if flags.contains(StreamFlags::RECV_UNKNOWN_TYPE_DATA) {
                let name = self.peer_table.name_of(header.data).map(str::to_string);
                let data = Bytes::copy_from_slice(payload);
                return Ok(Box::new(RawData::new(header.data, name, data)));
            }
            tracing::error!("received message of unresolvable proto type {}", header.data);
            return Err(ChannelError::UnrecognizedMessage(header.data));
        };

        if flags.contains(StreamFlags::SERIALIZER_IN_THREAD) {
            let (result, _) = transport::decode(message, payload.to_vec(), true).await;
            return result;
        }
        message
            .from_data(payload)
            .map_err(|e| match e {
                ChannelError::InvalidProtoData(_) => e,
                other => ChannelError::InvalidProtoData(other.to_string()),
            })?;
        Ok(message)
    }
}
