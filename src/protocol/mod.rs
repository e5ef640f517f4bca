//! Wire protocol: framing constants, the envelope codec, and the message body
//!
//! The protocol is UTF-8 text over TCP. Every frame except the acknowledgment
//! marker is terminated by the `<|EOM|>` delimiter; the delimiter cannot
//! legally appear inside a payload (payloads are not escaped). The
//! acknowledgment marker `<|ACK|>` is transmitted as its own complete send
//! with no trailing delimiter and is recognized by exact content match.

pub mod codec;
pub mod message;

pub use codec::{Frame, FrameKind};
pub use message::ChatMessage;
