use std::sync::atomic::AtomicUsize;

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use serde_json::json;
use tokio::time::timeout;

use super::*;
use crate::test_helpers::spawn_server;

const OPEN: &str = r#"0{"sid":"test-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

async fn recv_payload(sub: &mut Subscription) -> Value {
    timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("event receive timed out")
        .expect("subscription closed unexpectedly")
}

/// Perform the server half of the Engine.IO/Socket.IO handshake.
async fn accept_handshake(socket: &mut WebSocket) -> bool {
    if socket.send(WsMessage::Text(OPEN.into())).await.is_err() {
        return false;
    }
    while let Some(Ok(message)) = socket.recv().await {
        if let WsMessage::Text(text) = message {
            if text.as_str() == "40" {
                return socket.send(WsMessage::Text(r#"40{"sid":"ns-sid"}"#.into())).await.is_ok();
            }
        }
    }
    false
}

fn config_for(base: &str) -> YardConfig {
    let mut config = YardConfig::with_base_url(base).expect("valid base url");
    config.reconnect = ReconnectPolicy { initial_ms: 10, max_ms: 50 };
    config
}

// =============================================================
// Offline fan-out and registration
// =============================================================

#[tokio::test]
async fn publish_fans_out_to_every_listener_of_the_event() {
    let channel = EventChannel::offline();
    let mut dashboard = channel.subscribe(NEW_COIL_EVENT);
    let mut table = channel.subscribe(NEW_COIL_EVENT);
    let mut tasks = channel.subscribe(NEW_TASK_EVENT);

    let delivered = channel.publish(NEW_COIL_EVENT, json!({"coil_id": "Y1"}));

    assert_eq!(delivered, 2);
    assert_eq!(recv_payload(&mut dashboard).await["coil_id"], "Y1");
    assert_eq!(recv_payload(&mut table).await["coil_id"], "Y1");
    assert!(tasks.try_recv().is_none());
}

#[tokio::test]
async fn dropping_subscription_deregisters_listener() {
    let channel = EventChannel::offline();
    let first = channel.subscribe(NEW_COIL_EVENT);
    let second = channel.subscribe(NEW_COIL_EVENT);
    assert_eq!(channel.listener_count(), 2);

    drop(first);
    assert_eq!(channel.listener_count(), 1);
    assert_eq!(channel.publish(NEW_COIL_EVENT, json!({})), 1);

    drop(second);
    assert_eq!(channel.listener_count(), 0);
    assert_eq!(channel.publish(NEW_COIL_EVENT, json!({})), 0);
}

#[tokio::test]
async fn offline_channel_never_runs_a_connection() {
    let channel = EventChannel::offline();
    let _sub = channel.subscribe(NEW_COIL_EVENT);
    assert!(!channel.is_running());
    assert_eq!(*channel.status().borrow(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn subscription_ends_when_channel_is_dropped() {
    let channel = EventChannel::offline();
    let mut sub = channel.subscribe(NEW_COIL_EVENT);
    assert_eq!(sub.event(), NEW_COIL_EVENT);
    drop(channel);
    assert!(sub.recv().await.is_none());
}

#[test]
fn jitter_stays_within_a_quarter() {
    for _ in 0..100 {
        let delay = with_jitter(1000);
        assert!((1000..=1250).contains(&delay));
    }
    assert_eq!(with_jitter(3), 3);
}

// =============================================================
// Live socket
// =============================================================

#[tokio::test]
async fn live_channel_delivers_events_and_answers_pings() {
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<String>();
    let router = Router::new().route(
        "/socket.io/",
        get(move |ws: WebSocketUpgrade| {
            let pong_tx = pong_tx.clone();
            async move {
                ws.on_upgrade(move |mut socket| async move {
                    if !accept_handshake(&mut socket).await {
                        return;
                    }
                    let _ = socket.send(WsMessage::Text("2".into())).await;
                    let event = r#"42["new_coil",{"coil_id":"YLIVE","location":"A-B3-2","timestamp":"t","weight":12.5}]"#;
                    let _ = socket.send(WsMessage::Text(event.into())).await;
                    while let Some(Ok(message)) = socket.recv().await {
                        if let WsMessage::Text(text) = message {
                            let _ = pong_tx.send(text.as_str().to_owned());
                        }
                    }
                })
            }
        }),
    );
    let base = spawn_server(router).await;
    let channel = EventChannel::new(&config_for(&base));
    let mut status = channel.status();

    let mut sub = channel.subscribe(NEW_COIL_EVENT);
    assert!(channel.is_running());

    let payload = recv_payload(&mut sub).await;
    assert_eq!(payload["coil_id"], "YLIVE");
    assert_eq!(payload["weight"], 12.5);

    let pong = timeout(Duration::from_secs(5), pong_rx.recv()).await.expect("pong timed out").expect("pong");
    assert_eq!(pong, "3");

    timeout(Duration::from_secs(5), status.wait_for(|s| *s == ConnectionStatus::Connected))
        .await
        .expect("connected status timed out")
        .expect("status sender alive");
}

#[tokio::test]
async fn live_channel_reconnects_after_server_close() {
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let router = Router::new().route(
        "/socket.io/",
        get(move |ws: WebSocketUpgrade| {
            let counter = counter.clone();
            async move {
                ws.on_upgrade(move |mut socket| async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if !accept_handshake(&mut socket).await {
                        return;
                    }
                    let event = format!(r#"42["new_coil",{{"coil_id":"Y{n}","location":"A-B3-2"}}]"#);
                    let _ = socket.send(WsMessage::Text(event.into())).await;
                    let _ = socket.send(WsMessage::Text("1".into())).await;
                })
            }
        }),
    );
    let base = spawn_server(router).await;
    let channel = EventChannel::new(&config_for(&base));
    let mut sub = channel.subscribe(NEW_COIL_EVENT);

    assert_eq!(recv_payload(&mut sub).await["coil_id"], "Y0");
    assert_eq!(recv_payload(&mut sub).await["coil_id"], "Y1");
    assert!(connections.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn last_listener_detaching_stops_the_connection() {
    let router = Router::new().route(
        "/socket.io/",
        get(|ws: WebSocketUpgrade| async move {
            ws.on_upgrade(|mut socket| async move {
                if accept_handshake(&mut socket).await {
                    while let Some(Ok(_)) = socket.recv().await {}
                }
            })
        }),
    );
    let base = spawn_server(router).await;
    let channel = EventChannel::new(&config_for(&base));
    let mut status = channel.status();

    let dashboard = channel.subscribe(NEW_COIL_EVENT);
    let table = channel.subscribe(NEW_COIL_EVENT);
    timeout(Duration::from_secs(5), status.wait_for(|s| *s == ConnectionStatus::Connected))
        .await
        .expect("connected status timed out")
        .expect("status sender alive");

    drop(dashboard);
    assert!(channel.is_running(), "one listener remains");

    drop(table);
    assert!(!channel.is_running());
    assert_eq!(*channel.status().borrow(), ConnectionStatus::Disconnected);
}
