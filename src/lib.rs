//! roomcast: a minimal pub/sub message broker over raw TCP
//!
//! Clients connect, subscribe to named rooms, publish messages to a room,
//! and receive messages published by others to rooms they subscribe to.
//! Everything rides on a small text protocol with delimiter-based framing
//! and a synchronous acknowledgment handshake:
//!
//! ```text
//! Subscribe     <|SUB|><roomId><|EOM|>
//! Unsubscribe   <|UNSUB|><roomId><|EOM|>
//! Publish       <|MSG|><json><|EOM|>
//! Ack           <|ACK|>              (sent raw, no delimiter)
//! ```
//!
//! The publish payload is a compact JSON object (`RoomId`, `Name`,
//! `Message`, `MessageId`, `CreatedAt`). Messages are not persisted; they
//! exist only for the duration of transmission.
//!
//! # Architecture
//!
//! ```text
//!                    Broker (accept loop)
//!                          │
//!            ┌─────────────┼─────────────┐
//!            ▼             ▼             ▼
//!        [worker]      [worker]      [worker]     one per connection
//!            │             │             │
//!            └──── ConnectionRegistry ───┘        who is reachable
//!            └─── SubscriptionRegistry ──┘        who joined which room
//! ```
//!
//! A publish frame received on one worker is re-sent, ack round-trip by
//! ack round-trip, to every other connection subscribed to the room.
//!
//! # Example
//!
//! ```no_run
//! use roomcast::{Broker, BrokerConfig};
//!
//! # async fn example() -> roomcast::Result<()> {
//! let broker = Broker::bind(BrokerConfig::default()).await?;
//! broker.run().await
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod net;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;

pub use client::ChatClient;
pub use connection::SocketConnection;
pub use error::{ConnectionError, Error, Result};
pub use protocol::codec::Frame;
pub use protocol::message::ChatMessage;
pub use registry::{ConnectionRegistry, SubscriptionRegistry};
pub use server::{Broker, BrokerConfig};
pub use stats::BrokerStats;
