//! Concurrent registries for live connections and room subscriptions
//!
//! The two registries are the only shared mutable state in the broker; all
//! cross-worker interaction goes through their atomic operations. No
//! business logic lives here beyond add/update/remove/snapshot.
//!
//! ```text
//!         Arc<ConnectionRegistry>              Arc<SubscriptionRegistry>
//!   ┌──────────────────────────────┐    ┌──────────────────────────────┐
//!   │ connId -> Arc<SocketConn>    │    │ connId -> {roomId, roomId..} │
//!   └──────────────────────────────┘    └──────────────────────────────┘
//!      who is currently reachable          who joined which rooms
//! ```
//!
//! Both use an outer `RwLock` map with per-connection entry granularity, so
//! concurrent readers never serialize on a single global lock and writes
//! touch one entry at a time.

pub mod connections;
pub mod subscriptions;

pub use connections::ConnectionRegistry;
pub use subscriptions::SubscriptionRegistry;
