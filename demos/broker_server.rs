//! Broker bootstrap
//!
//! Run with: cargo run --example broker_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example broker_server                    # discovered address, port 11000
//!   cargo run --example broker_server 127.0.0.1          # 127.0.0.1:11000
//!   cargo run --example broker_server 0.0.0.0:12000      # explicit address and port

use std::net::{IpAddr, SocketAddr};

use roomcast::server::DEFAULT_PORT;
use roomcast::{Broker, BrokerConfig};

fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected IP:PORT, IP, or 'localhost'",
        arg
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roomcast=debug".parse()?),
        )
        .init();

    let bind_addr = match std::env::args().nth(1) {
        Some(arg) => parse_bind_addr(&arg).map_err(|e| {
            eprintln!("Error: {}", e);
            e
        })?,
        None => SocketAddr::new(roomcast::net::resolve_local_addr().await, DEFAULT_PORT),
    };

    let broker = Broker::bind(BrokerConfig::with_addr(bind_addr)).await?;
    println!("Broker listening on {}", broker.local_addr()?);

    broker
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    let stats = broker.stats().snapshot();
    println!(
        "Served {} connections, {} messages, {} deliveries ({} failed)",
        stats.total_connections, stats.messages_received, stats.deliveries, stats.delivery_failures
    );

    Ok(())
}
