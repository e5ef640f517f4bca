//! Framed, acknowledged connection over one TCP stream
//!
//! `SocketConnection` turns a byte-stream socket into a message-oriented
//! channel with a synchronous per-frame acknowledgment handshake:
//!
//! - the receiver of a complete non-ack frame transmits the ack marker
//!   before surfacing the frame;
//! - a sender transmits its frame and then consumes exactly the next
//!   inbound read cycle, succeeding only if it produced the ack marker.
//!
//! One socket, one reader: a connection has at most one long-running
//! inbound-receive loop, and a send awaiting its ack must not race it.
//! The coordination is a single-slot rendezvous: the sender parks a
//! oneshot in `ack_slot` and the inbound loop routes the next extracted
//! frame into it instead of handing it to the message handler. When no
//! loop is pumping the socket the sender takes the read cycle itself.
//!
//! Waits are unbounded: no timeout is applied to an ack or a receive, so a
//! silent peer blocks its sender until the transport errors out.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};

use crate::error::ConnectionError;
use crate::protocol::codec::{self, ACKNOWLEDGMENT, READ_CHUNK_SIZE};

static NEXT_FALLBACK_ID: AtomicU64 = AtomicU64::new(1);

/// A framed connection wrapping one accepted or outbound TCP stream
///
/// Owned exclusively: access is routed through the registries that hold it
/// by identity, plus the one worker running its inbound loop.
pub struct SocketConnection {
    id: String,
    reader: Mutex<FrameReader>,
    writer: Mutex<OwnedWriteHalf>,
    /// Single-slot rendezvous: a sender mid ack round-trip parks here and
    /// the inbound loop routes the next extracted frame to it.
    ack_slot: Mutex<Option<oneshot::Sender<String>>>,
    /// Serializes send/ack round-trips; at most one outstanding send.
    send_gate: Mutex<()>,
    /// Flips to `true` once on teardown; wakes in-flight operations.
    closed: watch::Sender<bool>,
}

/// Read half plus the accumulation buffer for partially-received frames
struct FrameReader {
    half: OwnedReadHalf,
    buf: BytesMut,
}

impl FrameReader {
    /// Read fixed-size chunks until the buffer holds one complete frame
    ///
    /// `None` on a zero-length read (orderly close) or a transport error
    /// (abrupt close).
    async fn next_frame(&mut self) -> Option<String> {
        loop {
            if let Some(frame) = codec::try_extract_frame(&mut self.buf) {
                return Some(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            match self.half.read(&mut chunk).await {
                Ok(0) => return None,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(_) => return None,
            }
        }
    }
}

impl SocketConnection {
    /// Wrap an accepted stream
    ///
    /// The identity is the remote peer's `addr:port`, falling back to a
    /// generated token when the peer address is unavailable. Stable for the
    /// connection's lifetime.
    pub fn new(stream: TcpStream) -> Self {
        let id = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| {
                format!("conn-{}", NEXT_FALLBACK_ID.fetch_add(1, Ordering::Relaxed))
            });
        Self::with_id(id, stream)
    }

    /// Wrap a stream under an explicit identity
    pub fn with_id(id: impl Into<String>, stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (closed, _) = watch::channel(false);

        Self {
            id: id.into(),
            reader: Mutex::new(FrameReader {
                half: read_half,
                buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            }),
            writer: Mutex::new(write_half),
            ack_slot: Mutex::new(None),
            send_gate: Mutex::new(()),
            closed,
        }
    }

    /// Open an outbound connection
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    /// Connection identity; the sole key into the registries
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the connection is still usable
    pub fn is_connected(&self) -> bool {
        !*self.closed.borrow()
    }

    fn is_disposed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Send a delimited frame and block for its acknowledgment
    ///
    /// `body` is the complete frame content without the trailing delimiter
    /// (control prefix included). Returns `Ok(true)` only if the next
    /// inbound read cycle produced the ack marker; any other frame, and any
    /// transport error during the send or the wait, yields `Ok(false)`.
    /// Use after teardown is a contract violation and errs distinctly.
    pub async fn send_and_await_ack(&self, body: &str) -> Result<bool, ConnectionError> {
        if self.is_disposed() {
            return Err(ConnectionError::Disposed);
        }

        let _gate = self.send_gate.lock().await;

        // Park the rendezvous before writing so a fast ack cannot slip
        // past the inbound loop unclaimed.
        let (tx, rx) = oneshot::channel();
        *self.ack_slot.lock().await = Some(tx);

        if let Err(e) = self.send_raw(&codec::encode_raw(body)).await {
            tracing::debug!(id = %self.id, error = %e, "send failed");
            self.ack_slot.lock().await.take();
            return Ok(false);
        }

        // Re-check after subscribing: a teardown landing in between would
        // otherwise go unnoticed (subscribe marks the current value seen).
        let mut closed = self.closed.subscribe();
        if self.is_disposed() {
            return Err(ConnectionError::Disposed);
        }

        // If an inbound loop is running it holds the reader lock and will
        // route the reply through the slot; otherwise take one read cycle
        // here.
        let mut rx = rx;
        let reply = match self.reader.try_lock() {
            Ok(mut reader) => {
                self.ack_slot.lock().await.take();
                // The loop may have routed the reply and released the lock
                // in the window before try_lock; drain the slot first.
                match rx.try_recv() {
                    Ok(frame) => Some(frame),
                    Err(_) => tokio::select! {
                        frame = reader.next_frame() => frame,
                        _ = closed.changed() => return Err(ConnectionError::Disposed),
                    },
                }
            }
            Err(_) => tokio::select! {
                reply = &mut rx => reply.ok(),
                _ = closed.changed() => return Err(ConnectionError::Disposed),
            },
        };

        Ok(reply.as_deref() == Some(ACKNOWLEDGMENT))
    }

    /// Receive the next frame destined for the message handler
    ///
    /// Accumulates reads until the codec reports a complete frame. On a
    /// complete non-ack frame, transmits the ack marker before returning it
    /// (an ack-send failure is logged and swallowed; the peer treats the
    /// missing ack as its own send failure). Frames claimed by a parked
    /// sender, and stray ack markers, are never surfaced here.
    ///
    /// `Ok(None)` means the connection closed, orderly or not.
    pub async fn receive_frame(&self) -> Result<Option<String>, ConnectionError> {
        if self.is_disposed() {
            return Err(ConnectionError::Disposed);
        }

        let mut reader = self.reader.lock().await;
        let mut closed = self.closed.subscribe();
        if self.is_disposed() {
            return Err(ConnectionError::Disposed);
        }

        loop {
            let frame = tokio::select! {
                frame = reader.next_frame() => frame,
                _ = closed.changed() => return Err(ConnectionError::Disposed),
            };

            let frame = match frame {
                Some(frame) => frame,
                None => {
                    // Unblock a sender parked on a reply that will never come.
                    self.ack_slot.lock().await.take();
                    return Ok(None);
                }
            };

            // A sender mid round-trip consumes the next inbound frame,
            // whatever it turns out to be.
            if let Some(waiter) = self.ack_slot.lock().await.take() {
                let _ = waiter.send(frame);
                continue;
            }

            if frame == ACKNOWLEDGMENT {
                // Nobody waiting for it; drop rather than hand to the handler.
                tracing::trace!(id = %self.id, "dropping stray ack");
                continue;
            }

            if let Err(e) = self.send_raw(ACKNOWLEDGMENT.as_bytes()).await {
                tracing::debug!(id = %self.id, error = %e, "failed to send ack");
            }
            return Ok(Some(frame));
        }
    }

    /// Write bytes, bailing out if teardown lands mid-write
    ///
    /// A write stalled against a full kernel buffer would otherwise hold
    /// the writer lock and block `dispose` indefinitely.
    async fn send_raw(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut closed = self.closed.subscribe();
        let mut writer = self.writer.lock().await;
        if self.is_disposed() {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        }
        tokio::select! {
            result = writer.write_all(bytes) => result,
            _ = closed.changed() => Err(std::io::ErrorKind::BrokenPipe.into()),
        }
    }

    /// Tear the connection down
    ///
    /// Shuts down the socket and wakes any in-flight operation so it fails
    /// immediately instead of blocking. Safe to call multiple times.
    pub async fn dispose(&self) {
        if self.closed.send_replace(true) {
            return;
        }

        // Drop a parked waiter so its sender sees a failed round-trip.
        self.ack_slot.lock().await.take();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::trace!(id = %self.id, error = %e, "socket shutdown");
        }
    }
}

impl std::fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConnection")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}
