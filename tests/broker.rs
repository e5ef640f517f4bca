//! End-to-end broker tests over loopback TCP

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

use roomcast::protocol::codec::MESSAGE_PREFIX;
use roomcast::{Broker, BrokerConfig, ChatClient, ChatMessage, SocketConnection};

async fn start_broker() -> (Arc<Broker>, SocketAddr, oneshot::Sender<()>) {
    let config = BrokerConfig::with_addr("127.0.0.1:0".parse().unwrap());
    let broker = Arc::new(Broker::bind(config).await.unwrap());
    let addr = broker.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = Arc::clone(&broker);
    tokio::spawn(async move {
        let _ = running
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await;
    });

    (broker, addr, stop_tx)
}

// Registration happens after the subscribe frame is acked, on the worker's
// dispatch turn; give the broker a moment to take it.
async fn settle() {
    sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_room_isolation() {
    let (_broker, addr, _stop) = start_broker().await;

    let (x, mut x_inbox) = ChatClient::connect(addr, "X").await.unwrap();
    let (y, mut y_inbox) = ChatClient::connect(addr, "Y").await.unwrap();
    let (z, mut z_inbox) = ChatClient::connect(addr, "Z").await.unwrap();

    assert!(x.subscribe("1").await.unwrap());
    assert!(y.subscribe("1").await.unwrap());
    assert!(z.subscribe("2").await.unwrap());
    settle().await;

    assert!(x.publish("1", "hi").await.unwrap());

    // Y, subscribed to room "1", receives the message.
    let msg = timeout(Duration::from_secs(5), y_inbox.recv())
        .await
        .expect("delivery timed out")
        .expect("inbox closed");
    assert_eq!(msg.room_id, "1");
    assert_eq!(msg.name, "X");
    assert_eq!(msg.message, "hi");

    // Z is subscribed only to room "2"; X is the publisher. Neither
    // receives anything.
    settle().await;
    assert!(z_inbox.try_recv().is_err());
    assert!(x_inbox.try_recv().is_err());
}

#[tokio::test]
async fn test_double_subscribe_then_unsubscribe_leaves_no_membership() {
    let (_broker, addr, _stop) = start_broker().await;

    let (x, _x_inbox) = ChatClient::connect(addr, "X").await.unwrap();
    let (y, mut y_inbox) = ChatClient::connect(addr, "Y").await.unwrap();

    assert!(y.subscribe("1").await.unwrap());
    assert!(y.subscribe("1").await.unwrap());
    assert!(y.unsubscribe("1").await.unwrap());
    settle().await;

    assert!(x.publish("1", "anyone there?").await.unwrap());
    settle().await;

    // One unsubscribe undoes both subscribes; no spurious delivery.
    assert!(y_inbox.try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribe_unknown_room_is_harmless() {
    let (_broker, addr, _stop) = start_broker().await;

    let (y, mut y_inbox) = ChatClient::connect(addr, "Y").await.unwrap();
    let (x, _x_inbox) = ChatClient::connect(addr, "X").await.unwrap();

    assert!(y.unsubscribe("never-joined").await.unwrap());
    assert!(y.subscribe("1").await.unwrap());
    settle().await;

    assert!(x.publish("1", "still works").await.unwrap());

    let msg = timeout(Duration::from_secs(5), y_inbox.recv())
        .await
        .expect("delivery timed out")
        .expect("inbox closed");
    assert_eq!(msg.message, "still works");
}

#[tokio::test]
async fn test_disconnect_cleans_both_registries() {
    let (broker, addr, _stop) = start_broker().await;

    let (y, _y_inbox) = ChatClient::connect(addr, "Y").await.unwrap();
    assert!(y.subscribe("1").await.unwrap());
    settle().await;

    assert_eq!(broker.connections().len().await, 1);
    assert_eq!(broker.subscriptions().connection_count().await, 1);

    y.close().await;
    settle().await;

    assert!(broker.connections().is_empty().await);
    assert_eq!(broker.subscriptions().connection_count().await, 0);
    assert_eq!(broker.stats().snapshot().active_connections, 0);
}

#[tokio::test]
async fn test_subscriber_vanishing_does_not_abort_fanout() {
    let (broker, addr, _stop) = start_broker().await;

    let (x, _x_inbox) = ChatClient::connect(addr, "X").await.unwrap();
    let (w, mut w_inbox) = ChatClient::connect(addr, "W").await.unwrap();
    let (y, _y_inbox) = ChatClient::connect(addr, "Y").await.unwrap();

    assert!(x.subscribe("1").await.unwrap());
    assert!(w.subscribe("1").await.unwrap());
    assert!(y.subscribe("1").await.unwrap());
    settle().await;

    // Y goes away without unsubscribing, right before the publish.
    y.close().await;

    // No error surfaces to the publisher and W is still served.
    assert!(x.publish("1", "carry on").await.unwrap());

    let msg = timeout(Duration::from_secs(5), w_inbox.recv())
        .await
        .expect("delivery timed out")
        .expect("inbox closed");
    assert_eq!(msg.message, "carry on");

    settle().await;
    assert_eq!(broker.connections().len().await, 2);
    assert_eq!(broker.subscriptions().connection_count().await, 2);
}

#[tokio::test]
async fn test_malformed_publish_dropped_silently() {
    let (broker, addr, _stop) = start_broker().await;

    let sender = SocketConnection::connect(addr).await.unwrap();
    let (y, mut y_inbox) = ChatClient::connect(addr, "Y").await.unwrap();
    assert!(y.subscribe("1").await.unwrap());
    settle().await;

    // The frame itself is acked (transport-level), then dropped at decode.
    let malformed = format!("{}{}", MESSAGE_PREFIX, "this is not json");
    assert!(sender.send_and_await_ack(&malformed).await.unwrap());

    // The connection stays open: a well-formed publish still routes.
    let valid = ChatMessage::new("1", "raw", "made it", 7);
    let frame = format!("{}{}", MESSAGE_PREFIX, valid.to_json().unwrap());
    assert!(sender.send_and_await_ack(&frame).await.unwrap());

    let msg = timeout(Duration::from_secs(5), y_inbox.recv())
        .await
        .expect("delivery timed out")
        .expect("inbox closed");
    assert_eq!(msg.message, "made it");
    assert_eq!(msg.message_id, 7);

    let stats = broker.stats().snapshot();
    assert_eq!(stats.messages_dropped, 1);
    assert_eq!(stats.messages_received, 1);
}

#[tokio::test]
async fn test_publish_with_no_subscribers_is_acked() {
    let (broker, addr, _stop) = start_broker().await;

    let (x, _x_inbox) = ChatClient::connect(addr, "X").await.unwrap();

    // The ack reflects transport health to the broker, not fan-out success.
    assert!(x.publish("empty-room", "echo?").await.unwrap());

    settle().await;
    let stats = broker.stats().snapshot();
    assert_eq!(stats.messages_received, 1);
    assert_eq!(stats.deliveries, 0);
}

#[tokio::test]
async fn test_shutdown_disposes_connections() {
    let (broker, addr, stop) = start_broker().await;

    let (y, mut y_inbox) = ChatClient::connect(addr, "Y").await.unwrap();
    assert!(y.subscribe("1").await.unwrap());
    settle().await;

    let _ = stop.send(());
    settle().await;

    // The broker-side teardown closes the socket; the client's receive
    // loop ends and its inbox drains to None.
    assert_eq!(broker.stats().snapshot().active_connections, 0);
    assert!(timeout(Duration::from_secs(5), y_inbox.recv())
        .await
        .expect("client loop did not end")
        .is_none());
}
