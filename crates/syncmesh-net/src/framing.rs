//! Message framing for network transport
//!
//! Length-prefixed frames: a 4-byte big-endian payload length followed
//! by the JSON-encoded envelope. End-of-message is explicit, never
//! inferred from a short read, and a connection can carry any number of
//! frames.

use bytes::{Buf, BufMut, BytesMut};
use syncmesh_core::Message;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame size (4 MB). A route table snapshot for even a large
/// cluster stays far below this.
const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max {MAX_FRAME_SIZE})")]
    TooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("envelope error: {0}")]
    Envelope(#[from] syncmesh_core::Error),
}

/// Codec for length-prefixed [`Message`] frames.
///
/// Wire format:
/// - 4 bytes: payload length (big-endian)
/// - N bytes: JSON envelope
#[derive(Debug, Default)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        if src.len() < 4 {
            return Ok(None);
        }

        // Peek at length
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(length));
        }

        // Need full frame
        if src.len() < 4 + length {
            return Ok(None);
        }

        src.advance(4);
        let payload = src.split_to(length);

        Ok(Some(Message::from_bytes(&payload)?))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        let payload = item.to_bytes()?;

        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(payload.len()));
        }

        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncmesh_core::RouteItem;

    fn heartbeat() -> Message {
        Message::heartbeat(RouteItem {
            peer_id: "p1".to_string(),
            group_id: "g1".to_string(),
            peer_addr: "10.0.0.1".to_string(),
            peer_port: 8000,
            node_port: 9000,
            flash_time: 0,
        })
    }

    #[test]
    fn test_frame_roundtrip() {
        let mut codec = MessageCodec;
        let msg = heartbeat();

        let mut buf = BytesMut::new();
        codec.encode(msg.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut codec = MessageCodec;

        let mut full = BytesMut::new();
        codec.encode(heartbeat(), &mut full).unwrap();

        // Feed the frame one byte short; decoder must not consume it
        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), full.len() - 1);

        partial.put_u8(full[full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn test_multiple_frames_in_one_buffer() {
        let mut codec = MessageCodec;

        let mut buf = BytesMut::new();
        codec.encode(heartbeat(), &mut buf).unwrap();
        codec.encode(Message::request("10.0.0.2:9000"), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), heartbeat());
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            Message::request("10.0.0.2:9000")
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut codec = MessageCodec;

        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        buf.put_slice(&[0; 16]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::TooLarge(_))
        ));
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let mut codec = MessageCodec;

        let mut buf = BytesMut::new();
        buf.put_u32(4);
        buf.put_slice(b"????");

        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::Envelope(_))
        ));
    }
}
