//! Broker dispatch loop
//!
//! Accepts connections, runs one independent worker per connection, and
//! performs broadcast delivery. The accept loop never blocks on connection
//! I/O; workers share no connection-local state and interact only through
//! the registries.
//!
//! Fan-out is sequential: each delivery completes its full ack round-trip
//! before the next begins, so a stalled subscriber delays the remainder of
//! that broadcast (head-of-line blocking). Kept deliberately: the protocol
//! has no timeouts, and parallelizing the fan-out would change delivery
//! interleaving visible to peers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{watch, Semaphore};

use crate::connection::SocketConnection;
use crate::error::Result;
use crate::protocol::codec::{self, Frame};
use crate::registry::{ConnectionRegistry, SubscriptionRegistry};
use crate::server::config::BrokerConfig;
use crate::stats::BrokerStats;

/// The pub/sub message broker
pub struct Broker {
    config: BrokerConfig,
    listener: TcpListener,
    connections: Arc<ConnectionRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    stats: Arc<BrokerStats>,
    shutdown: watch::Sender<bool>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl Broker {
    /// Bind the listening socket
    ///
    /// The listener is created here, before `run`, so the bound address is
    /// observable (relevant when binding port 0).
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        let socket = match config.bind_addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(config.bind_addr)?;
        let listener = socket.listen(config.backlog)?;

        tracing::info!(addr = %listener.local_addr()?, "broker listening");

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            listener,
            connections: Arc::new(ConnectionRegistry::new()),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            stats: Arc::new(BrokerStats::new()),
            shutdown,
            connection_semaphore,
        })
    }

    /// Address the broker is actually bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The connection registry (who is currently reachable)
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// The subscription registry (who joined which rooms)
    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    /// Broker counters
    pub fn stats(&self) -> &Arc<BrokerStats> {
        &self.stats
    }

    /// Run the accept loop until shut down externally
    pub async fn run(&self) -> Result<()> {
        self.accept_loop().await
    }

    /// Run until the given future resolves, then tear everything down
    ///
    /// On shutdown every registered connection is disposed so in-flight
    /// sends fail fast and workers exit promptly.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown signal received");
                Ok(())
            }
            result = self.accept_loop() => result,
        };

        let _ = self.shutdown.send(true);
        for (_, conn) in self.connections.all().await {
            conn.dispose().await;
        }

        result
    }

    async fn accept_loop(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer_addr, error = %e, "failed to set nodelay");
            }
        }

        let conn = Arc::new(SocketConnection::new(socket));
        self.connections.register(Arc::clone(&conn)).await;
        self.stats.record_connect();

        tracing::debug!(id = %conn.id(), peer = %peer_addr, "connection accepted");

        let connections = Arc::clone(&self.connections);
        let subscriptions = Arc::clone(&self.subscriptions);
        let stats = Arc::clone(&self.stats);
        let shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            worker(conn, connections, subscriptions, stats, shutdown).await;
            drop(permit);
        });
    }
}

/// Per-connection worker: receive loop plus teardown
///
/// Repeats until `receive_frame` reports a closed connection or the shared
/// shutdown signal fires, then unregisters the connection from both
/// registries and disposes it.
async fn worker(
    conn: Arc<SocketConnection>,
    connections: Arc<ConnectionRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    stats: Arc<BrokerStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            received = conn.receive_frame() => match received {
                Ok(Some(frame)) => frame,
                Ok(None) | Err(_) => break,
            },
            _ = shutdown.changed() => break,
        };

        dispatch(&frame, &conn, &connections, &subscriptions, &stats).await;
    }

    connections.unregister(conn.id()).await;
    subscriptions.remove_connection(conn.id()).await;
    conn.dispose().await;
    stats.record_disconnect();

    tracing::debug!(id = %conn.id(), "connection closed");
}

/// Interpret one inbound frame
async fn dispatch(
    frame: &str,
    sender: &Arc<SocketConnection>,
    connections: &ConnectionRegistry,
    subscriptions: &SubscriptionRegistry,
    stats: &BrokerStats,
) {
    match Frame::parse(frame) {
        Some(Frame::Subscribe(room_id)) => {
            subscriptions.add(sender.id(), &room_id).await;
            tracing::info!(id = %sender.id(), room = %room_id, "subscribed");
        }
        Some(Frame::Unsubscribe(room_id)) => {
            subscriptions.remove(sender.id(), &room_id).await;
            tracing::info!(id = %sender.id(), room = %room_id, "unsubscribed");
        }
        Some(Frame::Publish(payload)) => {
            let Some(message) = codec::decode_message(&payload) else {
                stats.record_dropped();
                tracing::debug!(id = %sender.id(), "dropping malformed publish frame");
                return;
            };

            stats.record_message();
            tracing::debug!(
                id = %sender.id(),
                room = %message.room_id,
                message_id = message.message_id,
                "message received"
            );

            broadcast(frame, &message.room_id, sender.id(), connections, subscriptions, stats)
                .await;
        }
        // The inbound loop never surfaces ack frames, and unknown content
        // is dropped without closing the connection.
        Some(Frame::Ack) | None => {
            tracing::trace!(id = %sender.id(), "ignoring unroutable frame");
        }
    }
}

/// Deliver a publish frame to every other connection subscribed to the room
///
/// Iterates a registry snapshot in order, one ack round-trip at a time.
/// Delivery failures are counted and logged, never abort the remaining
/// fan-out, and never surface to the publisher.
async fn broadcast(
    frame: &str,
    room_id: &str,
    sender_id: &str,
    connections: &ConnectionRegistry,
    subscriptions: &SubscriptionRegistry,
    stats: &BrokerStats,
) {
    for (conn_id, conn) in connections.all().await {
        if conn_id == sender_id {
            continue;
        }
        if !subscriptions.is_subscribed(&conn_id, room_id).await {
            continue;
        }

        match conn.send_and_await_ack(frame).await {
            Ok(true) => {
                stats.record_delivery();
                tracing::trace!(to = %conn_id, room = %room_id, "delivered");
            }
            Ok(false) => {
                stats.record_delivery_failure();
                tracing::debug!(to = %conn_id, room = %room_id, "delivery failed");
            }
            Err(e) => {
                // Torn down between snapshot and send.
                stats.record_delivery_failure();
                tracing::debug!(to = %conn_id, room = %room_id, error = %e, "delivery skipped");
            }
        }
    }
}
