//! Datagram transport abstraction.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use super::io::{classify, Retry};
use crate::error::Result;

/// A connectionless, message-oriented socket.
///
/// Every `send_to` writes one whole datagram and every `recv_from` reads one.
pub trait DatagramTransport: Send + Sync {
    /// Send one datagram to `target`.
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    /// Receive one datagram into `buf`.
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;
}

impl DatagramTransport for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }
}

impl<T: DatagramTransport> DatagramTransport for Arc<T> {
    fn send_to(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send {
        (**self).send_to(buf, target)
    }

    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send {
        (**self).recv_from(buf)
    }
}

/// Send one datagram, retrying transient errors.
pub async fn send_datagram<T>(
    transport: &T,
    buf: &[u8],
    target: SocketAddr,
    backoff: Duration,
) -> Result<usize>
where
    T: DatagramTransport,
{
    loop {
        match transport.send_to(buf, target).await {
            Ok(n) => return Ok(n),
            Err(e) => match classify(e) {
                Retry::Backoff => tokio::time::sleep(backoff).await,
                Retry::Now => {}
                Retry::Fail(err) => return Err(err),
            },
        }
    }
}

/// Receive one datagram, retrying transient errors.
pub async fn recv_datagram<T>(
    transport: &T,
    buf: &mut [u8],
    backoff: Duration,
) -> Result<(usize, SocketAddr)>
where
    T: DatagramTransport,
{
    loop {
        match transport.recv_from(buf).await {
            Ok(received) => return Ok(received),
            Err(e) => match classify(e) {
                Retry::Backoff => tokio::time::sleep(backoff).await,
                Retry::Now => {}
                Retry::Fail(err) => return Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_roundtrip() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = b.local_addr().unwrap();

        let backoff = Duration::from_millis(1);
        let sent = send_datagram(&a, b"ping", b_addr, backoff).await.unwrap();
        assert_eq!(sent, 4);

        let mut buf = [0u8; 16];
        let (n, from) = recv_datagram(&b, &mut buf, backoff).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_shared_socket() {
        let a = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let backoff = Duration::from_millis(1);
        send_datagram(&a, b"x", b.local_addr().unwrap(), backoff)
            .await
            .unwrap();

        let mut buf = [0u8; 4];
        let (n, _) = recv_datagram(&b, &mut buf, backoff).await.unwrap();
        assert_eq!(n, 1);
    }
}
