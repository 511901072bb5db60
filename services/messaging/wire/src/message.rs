//! Message framing.
//!
//! A frame is a 4-byte little-endian header followed by the payload:
//! `[id: u16][len: u16][payload]`. Datagram-like transports hand one frame
//! per read to [`Message::decode`]; byte-stream transports delimit frames
//! with [`MessageDecoder`].

use crate::error::FrameError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Size of the frame header
pub const HEADER_SIZE: usize = 4;

/// Largest frame that can cross the transport, header included
pub const MAX_FRAME_SIZE: usize = 64260;

/// Payloads must be strictly smaller than this
pub const MAX_PAYLOAD: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// Known message identifiers
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    /// GUI asks the daemon for its status
    StatusInfoRequest = 0x0001,
    /// GUI asks the daemon for tunnel details
    TunnelInfoRequest = 0x0002,
    /// GUI asks the daemon for the broker list
    BrokerListRequest = 0x0003,
    /// GUI pushes HomeAccess configuration to the daemon
    HaccessConfigInfo = 0x0004,
    /// GUI asks the daemon for HomeAccess status
    HaccessStatusInfoRequest = 0x0005,
    /// Daemon status
    StatusInfo = 0x0101,
    /// Tunnel details
    TunnelInfo = 0x0102,
    /// Broker list
    BrokerList = 0x0103,
    /// HomeAccess status
    HaccessStatusInfo = 0x0104,
}

impl MessageId {
    /// Whether the id is a request sent by the GUI side
    pub fn is_request(self) -> bool {
        (self as u16) < 0x0100
    }
}

impl TryFrom<u16> for MessageId {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(MessageId::StatusInfoRequest),
            0x0002 => Ok(MessageId::TunnelInfoRequest),
            0x0003 => Ok(MessageId::BrokerListRequest),
            0x0004 => Ok(MessageId::HaccessConfigInfo),
            0x0005 => Ok(MessageId::HaccessStatusInfoRequest),
            0x0101 => Ok(MessageId::StatusInfo),
            0x0102 => Ok(MessageId::TunnelInfo),
            0x0103 => Ok(MessageId::BrokerList),
            0x0104 => Ok(MessageId::HaccessStatusInfo),
            _ => Err(FrameError::UnknownId(value)),
        }
    }
}

impl From<MessageId> for u16 {
    fn from(id: MessageId) -> Self {
        id as u16
    }
}

/// One framed message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: u16,
    payload: Bytes,
}

impl Message {
    /// Build a message, rejecting payloads that would not fit in a frame
    pub fn new(id: impl Into<u16>, payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        let payload = payload.into();
        if payload.len() >= MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            id: id.into(),
            payload,
        })
    }

    /// Build a message with no payload (requests)
    pub fn empty(id: MessageId) -> Self {
        Self {
            id: id.into(),
            payload: Bytes::new(),
        }
    }

    /// Raw message id
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Known message id, if any
    pub fn kind(&self) -> Option<MessageId> {
        MessageId::try_from(self.id).ok()
    }

    /// Payload bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length as carried in the header
    pub fn len(&self) -> u16 {
        // Bounded by MAX_PAYLOAD at construction.
        self.payload.len() as u16
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Size of the encoded frame
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode to a contiguous frame
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the encoded frame to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.id);
        buf.put_u16_le(self.len());
        buf.put_slice(&self.payload);
    }

    /// Decode exactly one frame
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < HEADER_SIZE {
            return Err(FrameError::Incomplete);
        }

        let mut header = &frame[..HEADER_SIZE];
        let id = header.get_u16_le();
        let declared = header.get_u16_le() as usize;

        if declared >= MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge(declared));
        }

        let actual = frame.len() - HEADER_SIZE;
        if declared != actual {
            return Err(FrameError::LengthMismatch { declared, actual });
        }

        Ok(Self {
            id,
            payload: Bytes::copy_from_slice(&frame[HEADER_SIZE..]),
        })
    }
}

/// Peek the total frame length from a buffered header
pub fn peek_frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    let declared = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    Some(HEADER_SIZE + declared)
}

/// Splits a byte stream into messages
#[derive(Debug, Default)]
pub struct MessageDecoder {
    _priv: (),
}

impl MessageDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one message from the front of `buf`
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        let Some(frame_len) = peek_frame_len(buf) else {
            return Ok(None);
        };

        if frame_len - HEADER_SIZE >= MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge(frame_len - HEADER_SIZE));
        }

        if buf.len() < frame_len {
            return Ok(None);
        }

        let mut frame = buf.split_to(frame_len).freeze();
        let id = frame.get_u16_le();
        frame.advance(2);
        trace!("Decoded frame id={:#06x} len={}", id, frame.len());

        Ok(Some(Message { id, payload: frame }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_encode_layout() {
        let msg = Message::new(MessageId::StatusInfo, vec![0xAA, 0xBB, 0xCC]).unwrap();
        let bytes = msg.encode();

        assert_eq!(&bytes[..], &[0x01, 0x01, 0x03, 0x00, 0xAA, 0xBB, 0xCC]);
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_payload_limit() {
        let largest = vec![7u8; MAX_PAYLOAD - 1];
        let msg = Message::new(0x0101u16, largest).unwrap();
        assert_eq!(msg.encoded_size(), MAX_FRAME_SIZE - 1);
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);

        let err = Message::new(0x0101u16, vec![0u8; MAX_PAYLOAD]).unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge(MAX_PAYLOAD));
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert_eq!(Message::decode(&[0x01, 0x00]), Err(FrameError::Incomplete));

        // Header claims 5 bytes, only 2 present
        let short = [0x01, 0x00, 0x05, 0x00, 0x10, 0x20];
        assert_eq!(
            Message::decode(&short),
            Err(FrameError::LengthMismatch { declared: 5, actual: 2 })
        );

        let oversized = [0x01, 0x00, 0xFF, 0xFF];
        assert_eq!(
            Message::decode(&oversized),
            Err(FrameError::PayloadTooLarge(0xFFFF))
        );
    }

    #[test]
    fn test_unknown_id_is_preserved() {
        let msg = Message::decode(&[0x34, 0x12, 0x00, 0x00]).unwrap();
        assert_eq!(msg.id(), 0x1234);
        assert_eq!(msg.kind(), None);
        assert_eq!(
            MessageId::try_from(0x1234),
            Err(FrameError::UnknownId(0x1234))
        );
        assert!(MessageId::BrokerListRequest.is_request());
        assert!(!MessageId::BrokerList.is_request());
    }

    #[tokio::test]
    async fn test_decoder_over_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let sent = vec![
            Message::empty(MessageId::StatusInfoRequest),
            Message::new(MessageId::BrokerList, vec![b'x'; 100]).unwrap(),
            Message::new(MessageId::StatusInfo, vec![1, 2, 3, 4]).unwrap(),
        ];
        let to_send = sent.clone();

        tokio::spawn(async move {
            for msg in to_send {
                client.write_all(&msg.encode()).await.unwrap();
            }
        });

        let mut decoder = MessageDecoder::new();
        let mut buf = BytesMut::new();
        let mut received = Vec::new();

        while received.len() < sent.len() {
            if let Some(msg) = decoder.decode(&mut buf).unwrap() {
                received.push(msg);
                continue;
            }
            let n = server.read_buf(&mut buf).await.unwrap();
            assert!(n > 0, "stream closed early");
        }

        assert_eq!(received, sent);
        assert!(buf.is_empty());
    }
}
