//! Message envelope codec
//!
//! Encodes frames to bytes and extracts complete frames from an accumulation
//! buffer. Extraction scans the *entire* accumulated buffer for the
//! delimiter, so a delimiter split across two physical reads is still found.

use bytes::{Bytes, BytesMut};

use super::message::ChatMessage;

/// End-of-message delimiter; terminates every frame except the ack marker
pub const END_OF_MESSAGE: &str = "<|EOM|>";

/// Acknowledgment marker; sent raw with no trailing delimiter
pub const ACKNOWLEDGMENT: &str = "<|ACK|>";

/// Control prefix for subscribe frames
pub const SUBSCRIBE_PREFIX: &str = "<|SUB|>";

/// Control prefix for unsubscribe frames
pub const UNSUBSCRIBE_PREFIX: &str = "<|UNSUB|>";

/// Control prefix for publish frames
pub const MESSAGE_PREFIX: &str = "<|MSG|>";

/// Fixed chunk size for socket reads
pub const READ_CHUNK_SIZE: usize = 1024;

/// The four logical frame kinds sharing one physical format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Subscribe,
    Unsubscribe,
    Message,
    Ack,
}

impl FrameKind {
    /// Literal prefix for this kind (empty for the ack marker)
    pub fn prefix(&self) -> &'static str {
        match self {
            FrameKind::Subscribe => SUBSCRIBE_PREFIX,
            FrameKind::Unsubscribe => UNSUBSCRIBE_PREFIX,
            FrameKind::Message => MESSAGE_PREFIX,
            FrameKind::Ack => "",
        }
    }
}

/// Encode a frame of the given kind
///
/// Concatenates the kind's prefix with the payload and appends the
/// end-of-message delimiter. The ack marker is returned raw with no
/// delimiter and ignores the payload.
pub fn encode(kind: FrameKind, payload: &str) -> Bytes {
    if kind == FrameKind::Ack {
        return Bytes::from_static(ACKNOWLEDGMENT.as_bytes());
    }

    let prefix = kind.prefix();
    let mut buf = BytesMut::with_capacity(prefix.len() + payload.len() + END_OF_MESSAGE.len());
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(payload.as_bytes());
    buf.extend_from_slice(END_OF_MESSAGE.as_bytes());
    buf.freeze()
}

/// Terminate an already-prefixed frame body with the delimiter
///
/// Used when re-sending a received frame verbatim (broadcast fan-out keeps
/// the original prefix and payload untouched).
pub fn encode_raw(body: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + END_OF_MESSAGE.len());
    buf.extend_from_slice(body.as_bytes());
    buf.extend_from_slice(END_OF_MESSAGE.as_bytes());
    buf.freeze()
}

/// Try to extract one complete frame from the accumulation buffer
///
/// If the delimiter is found, everything before it (delimiter removed) is
/// returned and the buffer is advanced past it; scanning resumes on the
/// remainder on the next call. If the accumulated content equals the ack
/// marker exactly, that is a complete acknowledgment frame. Otherwise the
/// frame is incomplete and `None` is returned.
pub fn try_extract_frame(buf: &mut BytesMut) -> Option<String> {
    if let Some(pos) = find_delimiter(buf) {
        let frame = buf.split_to(pos);
        let _ = buf.split_to(END_OF_MESSAGE.len());
        return Some(String::from_utf8_lossy(&frame).into_owned());
    }

    if buf.as_ref() == ACKNOWLEDGMENT.as_bytes() {
        buf.clear();
        return Some(ACKNOWLEDGMENT.to_string());
    }

    None
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    let delim = END_OF_MESSAGE.as_bytes();
    if buf.len() < delim.len() {
        return None;
    }
    buf.windows(delim.len()).position(|w| w == delim)
}

/// A parsed frame, tagged by kind
///
/// One flat enum replaces per-kind handler dispatch: the broker matches on
/// this after extraction. `Publish` keeps the raw JSON payload so the frame
/// can be re-encoded verbatim for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `<|SUB|><roomId>`
    Subscribe(String),
    /// `<|UNSUB|><roomId>`
    Unsubscribe(String),
    /// `<|MSG|><json>`; payload not yet decoded
    Publish(String),
    /// The bare acknowledgment marker
    Ack,
}

impl Frame {
    /// Parse an extracted frame by its control prefix
    ///
    /// Returns `None` for content that matches no known kind; callers drop
    /// such frames silently.
    pub fn parse(text: &str) -> Option<Frame> {
        if text == ACKNOWLEDGMENT {
            return Some(Frame::Ack);
        }
        if let Some(room) = text.strip_prefix(SUBSCRIBE_PREFIX) {
            return Some(Frame::Subscribe(room.trim().to_string()));
        }
        if let Some(room) = text.strip_prefix(UNSUBSCRIBE_PREFIX) {
            return Some(Frame::Unsubscribe(room.trim().to_string()));
        }
        if let Some(payload) = text.strip_prefix(MESSAGE_PREFIX) {
            return Some(Frame::Publish(payload.to_string()));
        }
        None
    }
}

/// Decode the JSON payload of a publish frame
///
/// A parse failure yields `None`, never an error: the caller drops the
/// frame silently and the connection stays open.
pub fn decode_message(payload: &str) -> Option<ChatMessage> {
    serde_json::from_str(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_delimiter() {
        let bytes = encode(FrameKind::Subscribe, "lobby");
        assert_eq!(bytes.as_ref(), b"<|SUB|>lobby<|EOM|>");
    }

    #[test]
    fn test_encode_ack_is_raw() {
        let bytes = encode(FrameKind::Ack, "ignored");
        assert_eq!(bytes.as_ref(), b"<|ACK|>");
    }

    #[test]
    fn test_round_trip() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(FrameKind::Message, "{\"a\":1}"));

        let frame = try_extract_frame(&mut buf).unwrap();
        assert_eq!(frame, "<|MSG|>{\"a\":1}");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_incomplete_frame() {
        let mut buf = BytesMut::from(&b"<|SUB|>lobby<|EO"[..]);
        assert_eq!(try_extract_frame(&mut buf), None);
        assert_eq!(buf.len(), 16); // untouched
    }

    #[test]
    fn test_delimiter_split_across_reads() {
        // Delimiter arrives in two pieces; the search must cover the whole
        // accumulated buffer, not just the newest chunk.
        let mut buf = BytesMut::from(&b"<|SUB|>lobby<|EO"[..]);
        assert_eq!(try_extract_frame(&mut buf), None);

        buf.extend_from_slice(b"M|>");
        assert_eq!(try_extract_frame(&mut buf).as_deref(), Some("<|SUB|>lobby"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_buffer() {
        let mut buf = BytesMut::from(&b"<|SUB|>1<|EOM|><|UNSUB|>2<|EOM|>"[..]);

        assert_eq!(try_extract_frame(&mut buf).as_deref(), Some("<|SUB|>1"));
        assert_eq!(try_extract_frame(&mut buf).as_deref(), Some("<|UNSUB|>2"));
        assert_eq!(try_extract_frame(&mut buf), None);
    }

    #[test]
    fn test_ack_exact_match() {
        let mut buf = BytesMut::from(&b"<|ACK|>"[..]);
        assert_eq!(try_extract_frame(&mut buf).as_deref(), Some("<|ACK|>"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_ack_is_incomplete() {
        let mut buf = BytesMut::from(&b"<|ACK"[..]);
        assert_eq!(try_extract_frame(&mut buf), None);
    }

    #[test]
    fn test_frame_after_ack_remainder() {
        // Ack delivered back-to-back with a delimited frame: the delimited
        // frame is extracted first, the bare ack surfaces on the next call.
        let mut buf = BytesMut::from(&b"<|SUB|>1<|EOM|><|ACK|>"[..]);

        assert_eq!(try_extract_frame(&mut buf).as_deref(), Some("<|SUB|>1"));
        assert_eq!(try_extract_frame(&mut buf).as_deref(), Some("<|ACK|>"));
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!(
            Frame::parse("<|SUB|>room-1"),
            Some(Frame::Subscribe("room-1".into()))
        );
        assert_eq!(
            Frame::parse("<|UNSUB|> room-1 "),
            Some(Frame::Unsubscribe("room-1".into()))
        );
        assert_eq!(
            Frame::parse("<|MSG|>{\"x\":1}"),
            Some(Frame::Publish("{\"x\":1}".into()))
        );
        assert_eq!(Frame::parse("<|ACK|>"), Some(Frame::Ack));
        assert_eq!(Frame::parse("garbage"), None);
    }

    #[test]
    fn test_decode_malformed_message() {
        assert!(decode_message("not json").is_none());
        assert!(decode_message("{\"RoomId\":1}").is_none());
    }
}
