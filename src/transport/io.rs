//! Full-length read and write loops.
//!
//! Every frame is written and read completely or the call fails:
//! - a zero-byte read or write means the peer is gone (`ConnectionReset`)
//! - would-block and no-buffers errors sleep for the backoff, then retry
//! - interrupted calls are retried immediately
//! - anything else is returned as `Io`

use std::io::{self, IoSlice};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ChannelError, Result};
use crate::protocol::HEADER_SIZE;

/// Check for the OS "no buffer space" error.
#[cfg(unix)]
fn is_no_buffers(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOBUFS)
}

/// Check for the OS "no buffer space" error (`WSAENOBUFS`).
#[cfg(windows)]
fn is_no_buffers(err: &io::Error) -> bool {
    err.raw_os_error() == Some(10055)
}

#[cfg(not(any(unix, windows)))]
fn is_no_buffers(_err: &io::Error) -> bool {
    false
}

/// What to do after a failed transport call.
#[derive(Debug)]
pub(crate) enum Retry {
    /// Sleep for the backoff, then retry.
    Backoff,
    /// Retry immediately.
    Now,
    /// Give up with this error.
    Fail(ChannelError),
}

/// Classify a transport error.
pub(crate) fn classify(err: io::Error) -> Retry {
    match err.kind() {
        io::ErrorKind::WouldBlock => Retry::Backoff,
        io::ErrorKind::Interrupted => Retry::Now,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Retry::Fail(ChannelError::ConnectionReset),
        _ if is_no_buffers(&err) => Retry::Backoff,
        _ => Retry::Fail(ChannelError::Io(err)),
    }
}

/// Write all of `buf`.
pub async fn send_raw<W>(writer: &mut W, buf: &[u8], backoff: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]).await {
            Ok(0) => return Err(ChannelError::ConnectionReset),
            Ok(n) => written += n,
            Err(e) => match classify(e) {
                Retry::Backoff => tokio::time::sleep(backoff).await,
                Retry::Now => {}
                Retry::Fail(err) => return Err(err),
            },
        }
    }
    writer.flush().await?;
    Ok(())
}

/// Write one header and its payload as a single logical write.
///
/// Tries a single vectored write first and falls back to writing the
/// remainder after a partial write.
pub async fn send_frame<W>(
    writer: &mut W,
    header: &[u8; HEADER_SIZE],
    payload: &[u8],
    backoff: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total = HEADER_SIZE + payload.len();
    let mut written = 0;

    while written < total {
        let slices = remaining_slices(header, payload, written);
        match writer.write_vectored(&slices).await {
            Ok(0) => return Err(ChannelError::ConnectionReset),
            Ok(n) => written += n,
            Err(e) => match classify(e) {
                Retry::Backoff => tokio::time::sleep(backoff).await,
                Retry::Now => {}
                Retry::Fail(err) => return Err(err),
            },
        }
    }
    writer.flush().await?;
    Ok(())
}

fn remaining_slices<'a>(
    header: &'a [u8; HEADER_SIZE],
    payload: &'a [u8],
    skip: usize,
) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(2);
    if skip < HEADER_SIZE {
        slices.push(IoSlice::new(&header[skip..]));
        if !payload.is_empty() {
            slices.push(IoSlice::new(payload));
        }
    } else {
        slices.push(IoSlice::new(&payload[skip - HEADER_SIZE..]));
    }
    slices
}

/// Fill all of `buf`.
pub async fn recv_raw<R>(reader: &mut R, buf: &mut [u8], backoff: Duration) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => return Err(ChannelError::ConnectionReset),
            Ok(n) => filled += n,
            Err(e) => match classify(e) {
                Retry::Backoff => tokio::time::sleep(backoff).await,
                Retry::Now => {}
                Retry::Fail(err) => return Err(err),
            },
        }
    }
    Ok(())
}
