//! Frame encoding and incremental extraction
//!
//! Sentinel frames (default):
//!
//! ```text
//! 0xFF <type> <payload...> 0xFF <type | 0x80>
//! ```
//!
//! The end marker is found by scanning for `0xFF` followed by a byte >= 0x80,
//! so payloads must never contain that pair. Page data is UTF-8 plus codec
//! control bytes and UTF-8 never contains 0xFF.
//!
//! Length-prefixed frames carry a 4-byte big-endian payload length, the type
//! byte, then the payload. Both ends must agree on the format.

use memchr::memchr_iter;
use serde::{Deserialize, Serialize};

use super::message::{Message, MessageType};

pub const SENTINEL: u8 = 0xFF;
pub const END_FLAG: u8 = 0x80;

/// Smallest possible sentinel frame (empty payload)
const MIN_SENTINEL_FRAME: usize = 4;
const LENGTH_HEADER: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    #[default]
    Sentinel,
    LengthPrefixed,
}

/// Serialize one message into its wire form
pub fn encode(message: &Message, format: FrameFormat) -> Vec<u8> {
    let kind = message.message_type.as_u8();
    match format {
        FrameFormat::Sentinel => {
            let mut out = Vec::with_capacity(message.data.len() + MIN_SENTINEL_FRAME);
            out.push(SENTINEL);
            out.push(kind);
            out.extend_from_slice(&message.data);
            out.push(SENTINEL);
            out.push(kind | END_FLAG);
            out
        }
        FrameFormat::LengthPrefixed => {
            let mut out = Vec::with_capacity(message.data.len() + LENGTH_HEADER);
            out.extend_from_slice(&(message.data.len() as u32).to_be_bytes());
            out.push(kind);
            out.extend_from_slice(&message.data);
            out
        }
    }
}

/// Receive buffer that yields complete frames as they arrive
#[derive(Debug, Default)]
pub struct FrameBuffer {
    format: FrameFormat,
    buffer: Vec<u8>,
    /// Sentinel bytes before this offset are known not to start an end marker
    scanned: usize,
}

impl FrameBuffer {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            buffer: Vec::new(),
            scanned: 0,
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Every complete frame currently buffered, in arrival order
    pub fn extract_all(&mut self) -> Vec<Message> {
        std::iter::from_fn(|| self.extract()).collect()
    }

    pub fn extract(&mut self) -> Option<Message> {
        match self.format {
            FrameFormat::Sentinel => self.extract_sentinel(),
            FrameFormat::LengthPrefixed => self.extract_length_prefixed(),
        }
    }

    fn extract_sentinel(&mut self) -> Option<Message> {
        if self.buffer.len() < MIN_SENTINEL_FRAME {
            return None;
        }

        let end = memchr_iter(SENTINEL, &self.buffer[self.scanned..])
            .map(|offset| self.scanned + offset)
            .find(|&i| self.buffer.get(i + 1).is_some_and(|&b| b >= END_FLAG));

        let Some(end) = end else {
            // The last byte may be a sentinel still waiting for its partner
            self.scanned = self.buffer.len().saturating_sub(1);
            return None;
        };

        let declared = self.buffer[end + 1] & !END_FLAG;
        let data = if end >= 2 {
            self.buffer[2..end].to_vec()
        } else {
            Vec::new()
        };
        let starts_cleanly = self.buffer[0] == SENTINEL && self.buffer[1] == declared;
        self.buffer.drain(..end + 2);
        self.scanned = 0;

        let message_type = match MessageType::from_u8(declared) {
            Some(kind) if starts_cleanly => kind,
            _ => {
                tracing::debug!("invalid frame (declared type {:#04x})", declared);
                MessageType::Invalid
            }
        };
        Some(Message::new(message_type, data))
    }

    fn extract_length_prefixed(&mut self) -> Option<Message> {
        if self.buffer.len() < LENGTH_HEADER {
            return None;
        }

        let mut len = [0u8; 4];
        len.copy_from_slice(&self.buffer[..4]);
        let len = u32::from_be_bytes(len) as usize;
        let total = LENGTH_HEADER.checked_add(len)?;
        if self.buffer.len() < total {
            return None;
        }

        let declared = self.buffer[4];
        let data = self.buffer[LENGTH_HEADER..total].to_vec();
        self.buffer.drain(..total);

        let message_type = MessageType::from_u8(declared).unwrap_or_else(|| {
            tracing::debug!("invalid frame (declared type {:#04x})", declared);
            MessageType::Invalid
        });
        Some(Message::new(message_type, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: MessageType, data: &[u8]) -> Vec<u8> {
        encode(&Message::new(kind, data), FrameFormat::Sentinel)
    }

    #[test]
    fn test_sentinel_encoding() {
        assert_eq!(
            frame(MessageType::Navigation, b"http://a.test/"),
            b"\xff\x01http://a.test/\xff\x81".to_vec()
        );
        assert_eq!(frame(MessageType::Back, b""), vec![0xff, 0x02, 0xff, 0x82]);
    }

    #[test]
    fn test_two_frames_and_a_partial() {
        let mut buffer = FrameBuffer::new(FrameFormat::Sentinel);
        let third = frame(MessageType::PageData, b"\x00page\x01");

        buffer.extend(&frame(MessageType::Navigation, b"one"));
        buffer.extend(&frame(MessageType::Forward, b"forward"));
        buffer.extend(&third[..5]);

        let messages = buffer.extract_all();
        assert_eq!(
            messages,
            vec![
                Message::new(MessageType::Navigation, b"one".to_vec()),
                Message::new(MessageType::Forward, b"forward".to_vec()),
            ]
        );
        assert_eq!(buffer.pending(), &third[..5]);

        buffer.extend(&third[5..]);
        let messages = buffer.extract_all();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, MessageType::PageData);
        assert_eq!(messages[0].data, b"\x00page\x01");
        assert!(buffer.pending().is_empty());
    }

    #[test]
    fn test_mismatched_frame_is_invalid_and_decoding_resumes() {
        let mut buffer = FrameBuffer::new(FrameFormat::Sentinel);
        // Starts as NAVIGATION, terminated as BACK
        buffer.extend(b"\xff\x01oops\xff\x82");
        buffer.extend(&frame(MessageType::Navigation, b"next"));

        let messages = buffer.extract_all();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_type, MessageType::Invalid);
        assert_eq!(messages[0].data, b"oops");
        assert_eq!(
            messages[1],
            Message::new(MessageType::Navigation, b"next".to_vec())
        );
    }

    #[test]
    fn test_unknown_type_is_invalid() {
        let mut buffer = FrameBuffer::new(FrameFormat::Sentinel);
        buffer.extend(b"\xff\x30x\xff\xb0");
        let messages = buffer.extract_all();
        assert_eq!(messages[0].message_type, MessageType::Invalid);
    }

    #[test]
    fn test_garbage_before_frame() {
        let mut buffer = FrameBuffer::new(FrameFormat::Sentinel);
        buffer.extend(b"junk\xff\x83");
        buffer.extend(&frame(MessageType::Back, b"back"));

        let messages = buffer.extract_all();
        assert_eq!(messages[0].message_type, MessageType::Invalid);
        assert_eq!(messages[1].message_type, MessageType::Back);
    }

    #[test]
    fn test_split_end_marker() {
        let mut buffer = FrameBuffer::new(FrameFormat::Sentinel);
        let bytes = frame(MessageType::Navigation, b"abc");

        buffer.extend(&bytes[..bytes.len() - 1]);
        assert!(buffer.extract().is_none());
        buffer.extend(&bytes[bytes.len() - 1..]);
        assert_eq!(buffer.extract().map(|m| m.data), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_length_prefixed() {
        let mut buffer = FrameBuffer::new(FrameFormat::LengthPrefixed);
        let first = encode(
            &Message::new(MessageType::PageData, b"\xff\x81 is fine here".to_vec()),
            FrameFormat::LengthPrefixed,
        );
        assert_eq!(&first[..5], &[0, 0, 0, 15, 4]);

        let second = encode(&Message::empty(MessageType::Back), FrameFormat::LengthPrefixed);
        buffer.extend(&first);
        buffer.extend(&second[..3]);

        let messages = buffer.extract_all();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, b"\xff\x81 is fine here");

        buffer.extend(&second[3..]);
        assert_eq!(
            buffer.extract(),
            Some(Message::empty(MessageType::Back))
        );
    }
}
