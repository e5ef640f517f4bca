//! Local address discovery
//!
//! Startup-only helper for picking a bind/connect address when none is
//! configured. Never consulted after transport setup.

use std::net::{IpAddr, Ipv4Addr};

use tokio::net::UdpSocket;

/// Resolve the local address the OS would use for outbound traffic
///
/// Connecting a UDP socket sends no packets; the OS just performs the route
/// lookup, and `local_addr` reports the interface it picked. Falls back to
/// loopback when no route is available.
pub async fn resolve_local_addr() -> IpAddr {
    match probe_outbound_addr().await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::debug!(error = %e, "local address probe failed, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

async fn probe_outbound_addr() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect("8.8.8.8:53").await?;
    Ok(socket.local_addr()?.ip())
}
