use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::message::{SyncMessage, MAX_MESSAGE_SIZE};

/// Frame codec for sync messages: `[u32 BE len][u8 tag][bincode payload]`,
/// where `len` counts the tag and payload.
pub struct SyncCodec;

impl SyncCodec {
    pub fn encode(msg: &SyncMessage) -> SyncResult<Vec<u8>> {
        let payload = Self::encode_payload(msg)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(SyncError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + 1 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(msg.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode one frame from the front of `data`. Returns the message and
    /// the number of bytes consumed.
    pub fn decode(data: &[u8]) -> SyncResult<(SyncMessage, usize)> {
        if data.len() < 5 {
            return Err(SyncError::FramingError("too short".into()));
        }
        let len = Self::frame_len(&data[..4])?;
        let total = 4 + len;
        if data.len() < total {
            return Err(SyncError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let msg = Self::decode_tagged(data[4], &data[5..total])?;
        Ok((msg, total))
    }

    pub fn encode_payload(msg: &SyncMessage) -> SyncResult<Vec<u8>> {
        bincode::serialize(msg).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    pub fn decode_payload(data: &[u8]) -> SyncResult<SyncMessage> {
        bincode::deserialize(data).map_err(|e| SyncError::Deserialization(e.to_string()))
    }

    /// Write one framed message to `writer` and flush it.
    pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, msg: &SyncMessage) -> SyncResult<()> {
        let frame = Self::encode(msg)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        debug!(message = msg.type_name(), bytes = frame.len(), "wrote sync frame");
        Ok(())
    }

    /// Read exactly one framed message from `reader`.
    pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> SyncResult<SyncMessage> {
        let mut header = [0u8; 5];
        reader.read_exact(&mut header).await?;
        let len = Self::frame_len(&header[..4])?;
        let mut payload = vec![0u8; len - 1];
        reader.read_exact(&mut payload).await?;
        let msg = Self::decode_tagged(header[4], &payload)?;
        debug!(message = msg.type_name(), bytes = len + 4, "read sync frame");
        Ok(msg)
    }

    fn frame_len(prefix: &[u8]) -> SyncResult<usize> {
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if len < 1 {
            return Err(SyncError::FramingError("zero-length frame".into()));
        }
        if len - 1 > MAX_MESSAGE_SIZE {
            return Err(SyncError::MessageTooLarge {
                size: len - 1,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(len)
    }

    fn decode_tagged(tag: u8, payload: &[u8]) -> SyncResult<SyncMessage> {
        let msg = Self::decode_payload(payload)?;
        if msg.type_tag() != tag {
            return Err(SyncError::InvalidMessageType(tag));
        }
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heads(n: u8) -> SyncMessage {
        SyncMessage::Heads {
            log_id: "log-1".into(),
            heads: (0..n).map(|i| vec![i; 40]).collect(),
        }
    }

    #[test]
    fn frame_roundtrip() {
        let msg = heads(3);
        let encoded = SyncCodec::encode(&msg).unwrap();
        assert_eq!(encoded[4], 1);
        let (decoded, consumed) = SyncCodec::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_consumes_one_frame_of_many() {
        let mut data = SyncCodec::encode(&heads(1)).unwrap();
        let first_len = data.len();
        data.extend(SyncCodec::encode(&heads(2)).unwrap());
        let (first, consumed) = SyncCodec::decode(&data).unwrap();
        assert_eq!(consumed, first_len);
        assert_eq!(first, heads(1));
        let (second, _) = SyncCodec::decode(&data[consumed..]).unwrap();
        assert_eq!(second, heads(2));
    }

    #[test]
    fn decode_truncated() {
        let err = SyncCodec::decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, SyncError::FramingError(_)));

        let encoded = SyncCodec::encode(&heads(2)).unwrap();
        let err = SyncCodec::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(matches!(err, SyncError::FramingError(_)));
    }

    #[test]
    fn decode_zero_length() {
        let data = [0u8, 0, 0, 0, 0];
        let err = SyncCodec::decode(&data).unwrap_err();
        assert!(matches!(err, SyncError::FramingError(_)));
    }

    #[test]
    fn decode_oversized_length() {
        let len = (MAX_MESSAGE_SIZE as u32 + 2).to_be_bytes();
        let data = [len[0], len[1], len[2], len[3], 1];
        assert!(matches!(
            SyncCodec::decode(&data),
            Err(SyncError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn decode_wrong_tag() {
        let mut encoded = SyncCodec::encode(&heads(1)).unwrap();
        encoded[4] = 9;
        assert!(matches!(
            SyncCodec::decode(&encoded),
            Err(SyncError::InvalidMessageType(9))
        ));
    }

    #[tokio::test]
    async fn frames_over_a_stream() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let msg = heads(4);
        let sent = msg.clone();
        let writer = tokio::spawn(async move { SyncCodec::write_frame(&mut a, &sent).await });
        let received = SyncCodec::read_frame(&mut b).await.unwrap();
        writer.await.unwrap().unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn read_frame_on_closed_stream_fails() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(matches!(
            SyncCodec::read_frame(&mut b).await,
            Err(SyncError::Io(_))
        ));
    }
}
