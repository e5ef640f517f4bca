//! Line-oriented chat client
//!
//! Run with: cargo run --example chat_client <BROKER_ADDR> [NAME]
//!
//! Commands:
//!   subscribe <roomId>
//!   unsubscribe <roomId>
//!   send <roomId> <text>
//!   quit

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, BufReader};

use roomcast::ChatClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr: SocketAddr = std::env::args()
        .nth(1)
        .ok_or("usage: chat_client <BROKER_ADDR> [NAME]")?
        .parse()?;
    let name = std::env::args().nth(2).unwrap_or_else(|| "anonymous".into());

    let (client, mut inbox) = ChatClient::connect(addr, name).await?;
    println!("Connected to {} as {}", addr, client.id());

    tokio::spawn(async move {
        while let Some(msg) = inbox.recv().await {
            println!("[{}] {}: {}", msg.room_id, msg.name, msg.message);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();

        if let Some(room) = line.strip_prefix("subscribe ") {
            let ok = client.subscribe(room.trim()).await?;
            println!("subscribe {}: {}", room.trim(), if ok { "ok" } else { "failed" });
        } else if let Some(room) = line.strip_prefix("unsubscribe ") {
            let ok = client.unsubscribe(room.trim()).await?;
            println!("unsubscribe {}: {}", room.trim(), if ok { "ok" } else { "failed" });
        } else if let Some(rest) = line.strip_prefix("send ") {
            match rest.split_once(' ') {
                Some((room, text)) => {
                    let ok = client.publish(room, text).await?;
                    println!("send: {}", if ok { "ok" } else { "failed" });
                }
                None => println!("usage: send <roomId> <text>"),
            }
        } else if line == "quit" {
            client.close().await;
            break;
        } else if !line.is_empty() {
            println!("commands: subscribe <roomId> | unsubscribe <roomId> | send <roomId> <text> | quit");
        }
    }

    Ok(())
}
