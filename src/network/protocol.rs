use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::core::Timestamp;

/// Request: Int16 caller id, no payload
pub const REQUEST_LEN: usize = 2;

/// Response: Int16 caller id (echoed) + Int64 timestamp, both big-endian
pub const RESPONSE_LEN: usize = 10;

/// Caller correlation id carried in both directions.
pub type CallerId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampRequest {
    pub caller_id: CallerId,
}

impl TimestampRequest {
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_LEN);
        buf.put_u16(self.caller_id);
        buf.freeze()
    }

    #[must_use]
    pub fn decode(mut frame: &[u8]) -> Self {
        Self {
            caller_id: frame.get_u16(),
        }
    }

    /// Reads one request; `Ok(None)` on a clean EOF between frames.
    pub async fn read<R: AsyncReadExt + Unpin>(reader: &mut R) -> std::io::Result<Option<Self>> {
        let mut frame = [0u8; REQUEST_LEN];
        match reader.read_exact(&mut frame).await {
            Ok(_) => Ok(Some(Self::decode(&frame))),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write<W: AsyncWriteExt + Unpin>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.encode()).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampResponse {
    pub caller_id: CallerId,
    pub timestamp: Timestamp,
}

impl TimestampResponse {
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RESPONSE_LEN);
        buf.put_u16(self.caller_id);
        buf.put_u64(self.timestamp);
        buf.freeze()
    }

    #[must_use]
    pub fn decode(mut frame: &[u8]) -> Self {
        let caller_id = frame.get_u16();
        let timestamp = frame.get_u64();
        Self {
            caller_id,
            timestamp,
        }
    }

    pub async fn read<R: AsyncReadExt + Unpin>(reader: &mut R) -> std::io::Result<Self> {
        let mut frame = [0u8; RESPONSE_LEN];
        reader.read_exact(&mut frame).await?;
        Ok(Self::decode(&frame))
    }

    pub async fn write<W: AsyncWriteExt + Unpin>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await
    }
}
