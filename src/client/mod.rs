//! Client-side API for the broker protocol
//!
//! `ChatClient` opens an outbound framed connection, runs a background
//! receive loop that acks inbound publish frames, and surfaces decoded
//! messages on a channel. Interactive front ends sit on top of this (see
//! the `chat_client` demo).
//!
//! # Example
//! ```no_run
//! use roomcast::ChatClient;
//!
//! # async fn example() -> roomcast::Result<()> {
//! let (client, mut inbox) = ChatClient::connect("127.0.0.1:11000".parse().unwrap(), "alice").await?;
//!
//! tokio::spawn(async move {
//!     while let Some(msg) = inbox.recv().await {
//!         println!("[{}] {}: {}", msg.room_id, msg.name, msg.message);
//!     }
//! });
//!
//! client.subscribe("lobby").await?;
//! client.publish("lobby", "hello").await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use crate::connection::SocketConnection;
use crate::error::Result;
use crate::protocol::codec::{
    self, Frame, MESSAGE_PREFIX, SUBSCRIBE_PREFIX, UNSUBSCRIBE_PREFIX,
};
use crate::protocol::message::ChatMessage;

/// A connected chat client
pub struct ChatClient {
    conn: Arc<SocketConnection>,
    name: String,
    message_seed: AtomicU64,
}

impl ChatClient {
    /// Connect to a broker
    ///
    /// Returns the client and a receiver carrying messages published to
    /// rooms this client subscribes to. The receive loop acks every inbound
    /// publish frame and exits when the connection closes.
    pub async fn connect(
        addr: SocketAddr,
        name: impl Into<String>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChatMessage>)> {
        let conn = Arc::new(SocketConnection::connect(addr).await?);
        let (tx, rx) = mpsc::unbounded_channel();

        let reader = Arc::clone(&conn);
        tokio::spawn(async move {
            loop {
                let frame = match reader.receive_frame().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) | Err(_) => break,
                };

                if let Some(Frame::Publish(payload)) = Frame::parse(&frame) {
                    if let Some(message) = codec::decode_message(&payload) {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(id = %reader.id(), "client receive loop ended");
        });

        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);

        Ok((
            Self {
                conn,
                name: name.into(),
                message_seed: AtomicU64::new(seed),
            },
            rx,
        ))
    }

    /// Connection identity assigned to this client
    pub fn id(&self) -> &str {
        self.conn.id()
    }

    /// Join a room; `true` once the broker acks the frame
    pub async fn subscribe(&self, room_id: &str) -> Result<bool> {
        let frame = format!("{}{}", SUBSCRIBE_PREFIX, room_id);
        Ok(self.conn.send_and_await_ack(&frame).await?)
    }

    /// Leave a room; unknown rooms are a no-op on the broker
    pub async fn unsubscribe(&self, room_id: &str) -> Result<bool> {
        let frame = format!("{}{}", UNSUBSCRIBE_PREFIX, room_id);
        Ok(self.conn.send_and_await_ack(&frame).await?)
    }

    /// Publish a message to a room
    ///
    /// The returned flag reflects the broker's ack of this frame only; it
    /// says nothing about fan-out to subscribers.
    pub async fn publish(&self, room_id: &str, text: &str) -> Result<bool> {
        let message = ChatMessage::new(room_id, self.name.clone(), text, self.next_message_id());
        let json = message.to_json()?;
        let frame = format!("{}{}", MESSAGE_PREFIX, json);
        Ok(self.conn.send_and_await_ack(&frame).await?)
    }

    /// Disconnect from the broker
    pub async fn close(&self) {
        self.conn.dispose().await;
    }

    // Unchecked pseudo-random draw (an LCG step); ids are correlation
    // hints, not keys, and are not collision-checked anywhere.
    fn next_message_id(&self) -> i64 {
        let next = self
            .message_seed
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |seed| {
                Some(
                    seed.wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407),
                )
            })
            .unwrap_or(1);
        (next >> 1) as i64
    }
}
