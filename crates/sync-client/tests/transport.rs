//! Sync client against stand-in relays served by axum.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::{any, post};
use axum::{Json, Router};
use convoy_schemas::{
    ConvoyMessage, DeviceRole, MessageType, Payload, RangeUpdate, RoleAssigned, RoleRejected,
};
use convoy_sync_client::{ConnectionState, Delivery, SyncClient, SyncClientConfig};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Clone, Copy, PartialEq)]
enum SocketMode {
    Absent,
    Assign,
    Reject,
}

#[derive(Clone)]
struct Relay {
    mode: SocketMode,
    received: mpsc::UnboundedSender<Value>,
    polls: Arc<Mutex<Vec<Value>>>,
}

async fn upgrade(State(relay): State<Relay>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, relay))
}

async fn serve_socket(mut socket: WebSocket, relay: Relay) {
    while let Some(Ok(frame)) = socket.recv().await {
        let Message::Text(text) = frame else { continue };
        let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        if value["type"] == "register" && relay.mode == SocketMode::Reject {
            let _ = relay.received.send(value);
            let rejected =
                ConvoyMessage::from_relay(Payload::RoleRejected(RoleRejected::no_role_available()));
            let Ok(encoded) = rejected.encode() else { return };
            let _ = socket.send(Message::Text(encoded.into())).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        if value["type"] == "register" {
            let assigned = ConvoyMessage::from_relay(Payload::RoleAssigned(RoleAssigned {
                assigned_role: DeviceRole::LEAD_REAR,
            }));
            let Ok(encoded) = assigned.encode() else { return };
            // Garbage first: the client must drop it and keep going.
            if socket.send(Message::Text("{not json".into())).await.is_err()
                || socket.send(Message::Text(encoded.into())).await.is_err()
            {
                return;
            }
        }
        let _ = relay.received.send(value);
    }
}

async fn submit(State(relay): State<Relay>, Json(body): Json<Value>) -> Json<Value> {
    let _ = relay.received.send(body);
    Json(json!({"success": true}))
}

async fn poll(State(relay): State<Relay>, Json(body): Json<Value>) -> Json<Vec<Value>> {
    let _ = relay.received.send(json!({"polled": body}));
    let mut queued = relay.polls.lock().await;
    Json(std::mem::take(&mut *queued))
}

type Spawned = (String, mpsc::UnboundedReceiver<Value>, Arc<Mutex<Vec<Value>>>);

async fn spawn_relay(mode: SocketMode) -> std::io::Result<Spawned> {
    let (tx, rx) = mpsc::unbounded_channel();
    let relay = Relay {
        mode,
        received: tx,
        polls: Arc::new(Mutex::new(Vec::new())),
    };
    let polls = relay.polls.clone();
    let mut app = Router::new()
        .route("/convoy/send", post(submit))
        .route("/convoy/poll", post(poll));
    if mode != SocketMode::Absent {
        app = app.route("/", any(upgrade));
    }
    let app = app.with_state(relay);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("ws://{addr}"), rx, polls))
}

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn registers_and_receives_role() -> TestResult {
    let (url, mut received, _) = spawn_relay(SocketMode::Assign).await?;
    let client = SyncClient::start(SyncClientConfig::new(url))?;

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = client.subscribe(move |message| {
        sink.lock()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
            .push(message.kind());
        Ok(())
    });

    let register = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await?
        .ok_or("relay closed")?;
    assert_eq!(register["type"], "register");

    assert!(wait_for(|| client.assigned_role() == Some(DeviceRole::LEAD_REAR)).await);
    assert!(client.is_connected());
    let kinds = seen.lock().map_err(|e| e.to_string())?.clone();
    assert_eq!(kinds, vec![MessageType::RoleAssigned]);

    let delivery = client.send(Payload::Range(RangeUpdate {
        remaining_range: 412.0,
    }))?;
    assert_eq!(delivery, Delivery::Socket);
    let range = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await?
        .ok_or("relay closed")?;
    assert_eq!(range["type"], "range");
    assert_eq!(range["deviceRole"], "car1-rear");

    client.disconnect().await;
    assert_eq!(client.status().state, ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn send_without_socket_uses_http() -> TestResult {
    let (url, mut received, _) = spawn_relay(SocketMode::Absent).await?;
    let mut config = SyncClientConfig::new(url);
    config.requested_role = Some(DeviceRole::TRAILING_MAIN);
    config.reconnect_base_ms = 60_000;
    let client = SyncClient::start(config)?;

    let delivery = client.send(Payload::ResumeNavigation)?;
    assert_eq!(delivery, Delivery::Http);

    let body = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await?
        .ok_or("relay closed")?;
    assert_eq!(body["type"], "resume_navigation");
    assert_eq!(body["deviceRole"], "car2-main");

    client.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn falls_back_to_polling_after_retries() -> TestResult {
    let (url, mut received, polls) = spawn_relay(SocketMode::Absent).await?;
    let queued = ConvoyMessage::from_device(
        DeviceRole::LEAD_MAIN,
        Payload::Range(RangeUpdate {
            remaining_range: 300.0,
        }),
    );
    polls.lock().await.push(serde_json::to_value(&queued)?);
    polls.lock().await.push(json!({"type": "bogus", "data": {}}));

    let mut config = SyncClientConfig::new(url);
    config.requested_role = Some(DeviceRole::LEAD_REAR);
    config.reconnect_base_ms = 1;
    config.reconnect_cap_ms = 5;
    config.max_reconnect_attempts = 2;
    config.poll_interval_ms = 50;
    let client = SyncClient::start(config)?;

    let ranges = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = ranges.clone();
    let _subscription = client.subscribe(move |message| {
        if message.kind() == MessageType::Range {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        Ok(())
    });

    assert!(wait_for(|| client.status().polling_active).await);
    assert!(wait_for(|| ranges.load(std::sync::atomic::Ordering::SeqCst) == 1).await);

    let polled = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await?
        .ok_or("relay closed")?;
    assert_eq!(polled["polled"]["deviceRole"], "car1-rear");
    assert_eq!(client.status().reconnect_attempt, 2);

    client.disconnect().await;
    assert!(!client.status().polling_active);
    Ok(())
}

#[tokio::test]
async fn repeated_rejections_still_back_off_into_polling() -> TestResult {
    let (url, mut received, _) = spawn_relay(SocketMode::Reject).await?;
    let mut config = SyncClientConfig::new(url);
    config.reconnect_base_ms = 1;
    config.reconnect_cap_ms = 5;
    config.max_reconnect_attempts = 3;
    config.poll_interval_ms = 50;
    let client = SyncClient::start(config)?;

    assert!(wait_for(|| client.status().polling_active).await);
    let status = client.status();
    assert_eq!(status.reconnect_attempt, 3);
    assert_eq!(status.assigned_role, None);

    // One register per session: the first connect and each of the three retries.
    let mut registers = 0;
    while let Ok(value) = received.try_recv() {
        if value["type"] == "register" {
            registers += 1;
        }
    }
    assert_eq!(registers, 4);

    client.disconnect().await;
    Ok(())
}
