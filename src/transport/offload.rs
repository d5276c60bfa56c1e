//! Encode and decode on a blocking worker thread.

use crate::error::{ChannelError, Result};
use crate::proto::Proto;

/// Run `f` on the blocking pool and wait for it.
pub async fn run_blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ChannelError::SerializationError(format!("serializer thread failed: {e}")))
}

/// Encode `message`, optionally on a worker thread.
pub async fn encode(message: &dyn Proto, in_thread: bool) -> Result<Vec<u8>> {
    if !in_thread {
        return message.to_data();
    }
    let owned = message.clone_box();
    run_blocking(move || owned.to_data()).await?
}

/// Decode `payload` into `message`, optionally on a worker thread.
///
/// Hands the payload vector back so its allocation can be reused. Any decode
/// failure is reported as `InvalidProtoData`.
pub async fn decode(
    mut message: Box<dyn Proto>,
    payload: Vec<u8>,
    in_thread: bool,
) -> (Result<Box<dyn Proto>>, Option<Vec<u8>>) {
    if !in_thread {
        let result = message.from_data(&payload).map(|()| message);
        return (result.map_err(as_data_error), Some(payload));
    }
    let joined = run_blocking(move || {
        let result = message.from_data(&payload);
        (result.map(|()| message), payload)
    })
    .await;
    match joined {
        Ok((result, payload)) => (result.map_err(as_data_error), Some(payload)),
        Err(err) => (Err(err), None),
    }
}

fn as_data_error(err: ChannelError) -> ChannelError {
    match err {
        ChannelError::InvalidProtoData(_) => err,
        other => ChannelError::InvalidProtoData(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::RawData;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_encode_in_thread_matches_inline() {
        let raw = RawData::new(20, None, Bytes::from_static(b"abc"));
        let inline = encode(&raw, false).await.unwrap();
        let threaded = encode(&raw, true).await.unwrap();
        assert_eq!(inline, threaded);
    }

    #[tokio::test]
    async fn test_decode_in_thread_returns_buffer() {
        let message: Box<dyn Proto> = Box::new(RawData::default());
        let (result, payload) = decode(message, b"xyz".to_vec(), true).await;

        let message = result.unwrap();
        assert_eq!(message.to_data().unwrap(), b"xyz");
        assert_eq!(payload.unwrap(), b"xyz");
    }

    #[tokio::test]
    async fn test_run_blocking_panic_is_error() {
        let result: Result<()> = run_blocking(|| panic!("boom")).await;
        assert!(matches!(result, Err(ChannelError::SerializationError(_))));
    }
}
