//! Publish message body
//!
//! The JSON object embedded in a `<|MSG|>` frame. Field names and casing are
//! part of the wire contract and must not change; existing peers match them
//! exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published chat message
///
/// Immutable once constructed. `message_id` is generated by the sender and
/// is not guaranteed unique; treat it as an opaque correlation hint, not a
/// primary key. `created_at` is set by the sender and round-trips through
/// ISO-8601.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChatMessage {
    /// Target room
    pub room_id: String,
    /// Sender display name
    pub name: String,
    /// Message body
    pub message: String,
    /// Sender-generated correlation id
    pub message_id: i64,
    /// Creation time (UTC, set by the sender)
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message stamped with the current time
    pub fn new(
        room_id: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
        message_id: i64,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            name: name.into(),
            message: message.into(),
            message_id,
            created_at: Utc::now(),
        }
    }

    /// Serialize to the compact JSON wire form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
