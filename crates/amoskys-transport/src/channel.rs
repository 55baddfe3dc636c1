//! The framed channel: length-prefixed frames over an established TLS
//! stream. `amoskys-envelope::codec` owns the bincode shape of what's
//! inside a frame; this layer only knows about the 4-byte big-endian
//! length prefix and the configured size cap.

use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

const LENGTH_PREFIX_BYTES: usize = 4;

/// A bidirectional, mutex-guarded framed channel over any TLS-wrapped
/// stream. Generic over the concrete `tokio-rustls` stream type so the
/// same implementation serves both the bus's accept side and the agent's
/// connect side.
pub struct FramedChannel<IO> {
    stream: AsyncMutex<IO>,
    max_frame_bytes: usize,
    peer_description: String,
}

impl<IO> FramedChannel<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: IO, max_frame_bytes: usize, peer_description: impl Into<String>) -> Self {
        Self {
            stream: AsyncMutex::new(stream),
            max_frame_bytes,
            peer_description: peer_description.into(),
        }
    }

    pub fn peer_description(&self) -> &str {
        &self.peer_description
    }

    /// Writes one frame: a 4-byte big-endian length prefix followed by
    /// `payload`. Rejects payloads over `max_frame_bytes` before writing
    /// anything, so a caller's size mistake never corrupts the stream
    /// with a half-written frame.
    pub async fn write_frame(&self, payload: &[u8]) -> Result<(), CoreError> {
        if payload.len() > self.max_frame_bytes {
            return Err(CoreError::new(
                codes::TRANSPORT_FRAME_TOO_LARGE,
                format!("frame of {} bytes exceeds limit of {}", payload.len(), self.max_frame_bytes),
            ));
        }
        let mut guard = self.stream.lock().await;
        let len = (payload.len() as u32).to_be_bytes();
        guard
            .write_all(&len)
            .await
            .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "failed to write frame length").with_cause(e))?;
        guard
            .write_all(payload)
            .await
            .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "failed to write frame body").with_cause(e))?;
        guard
            .flush()
            .await
            .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "failed to flush frame").with_cause(e))
    }

    /// Reads one frame. Returns `Ok(None)` on a clean EOF between frames
    /// (the peer closed the connection); any other truncation is an
    /// error, since a half-received length prefix or body means the
    /// stream is no longer framing-aligned.
    pub async fn read_frame(&self) -> Result<Option<Vec<u8>>, CoreError> {
        let mut guard = self.stream.lock().await;

        let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
        match guard.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(CoreError::new(codes::TRANSPORT_IO, "failed to read frame length").with_cause(e)),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_bytes {
            return Err(CoreError::new(
                codes::TRANSPORT_FRAME_TOO_LARGE,
                format!("peer announced frame of {len} bytes, exceeds limit of {}", self.max_frame_bytes),
            ));
        }

        let mut body = vec![0u8; len];
        guard
            .read_exact(&mut body)
            .await
            .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "failed to read frame body").with_cause(e))?;
        Ok(Some(body))
    }

    pub async fn shutdown(&self) -> Result<(), CoreError> {
        let mut guard = self.stream.lock().await;
        guard
            .shutdown()
            .await
            .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "failed to shut down channel").with_cause(e))
    }
}

pub type SharedChannel<IO> = Arc<FramedChannel<IO>>;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let (client_io, server_io) = duplex(4096);
        let client = FramedChannel::new(client_io, 1024, "client");
        let server = FramedChannel::new(server_io, 1024, "server");

        client.write_frame(b"hello").await.unwrap();
        let received = server.read_frame().await.unwrap().unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn rejects_frame_over_local_limit() {
        let (client_io, _server_io) = duplex(4096);
        let client = FramedChannel::new(client_io, 4, "client");
        assert!(client.write_frame(b"too big").await.is_err());
    }

    #[tokio::test]
    async fn clean_close_yields_none() {
        let (client_io, server_io) = duplex(4096);
        let server = FramedChannel::new(server_io, 1024, "server");
        drop(client_io);
        assert!(server.read_frame().await.unwrap().is_none());
    }
}
