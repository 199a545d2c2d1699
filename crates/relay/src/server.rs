//! HTTP and WebSocket surface of the relay.
//!
//! - `GET /` upgrades to the message socket
//! - `POST /convoy/send` routes one message with the socket scope rules
//! - `POST /convoy/poll` drains the queue of a polling device
//! - `GET /health` reports connections, slots and cached state.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use convoy_schemas::{ConvoyMessage, DeviceRole};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::hub::{HealthReport, Hub, Outbound};

/// Build the relay's HTTP and WebSocket routes.
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/", any(socket_handler))
        .route("/convoy/send", post(send_handler))
        .route("/convoy/poll", post(poll_handler))
        .route("/health", get(health_handler))
        .with_state(hub)
}

/// Bind the configured address and serve until the process is interrupted.
pub async fn serve(config: RelayConfig) -> RelayResult<()> {
    let addr = config.bind;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind { addr, source })?;
    let hub = Arc::new(Hub::new(config));
    info!(%addr, "Convoy relay listening");

    axum::serve(listener, router(hub))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
        })
        .await?;
    Ok(())
}

/// Serve on an already bound listener in the background.
pub fn spawn(listener: TcpListener, hub: Arc<Hub>) -> RelayResult<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(hub)).await {
            error!(error = %e, "Relay server error");
        }
    });
    Ok((addr, handle))
}

async fn socket_handler(State(hub): State<Arc<Hub>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, hub))
}

async fn run_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = hub.connect(tx);
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(reason) => {
                    let close = CloseFrame {
                        code: close_code::POLICY,
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(close))).await;
                    break;
                }
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => hub.handle_text(id, text.as_str()),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => hub.handle_text(id, text),
                Err(_) => warn!(connection = %id, len = bytes.len(), "Dropping non UTF-8 frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %id, error = %e, "Socket error");
                break;
            }
        }
    }

    hub.disconnect(id);
    writer.abort();
}

async fn send_handler(State(hub): State<Arc<Hub>>, Json(body): Json<Value>) -> Response {
    let result = ConvoyMessage::from_value(body)
        .map_err(RelayError::from)
        .and_then(|message| hub.route(message, None));
    match result {
        Ok(delivered) => Json(json!({ "success": true, "delivered": delivered })).into_response(),
        Err(e) => {
            warn!(error = %e, "Rejected HTTP submission");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollRequest {
    #[serde(default)]
    device_role: Option<DeviceRole>,
}

async fn poll_handler(State(hub): State<Arc<Hub>>, Json(request): Json<PollRequest>) -> Json<Vec<Value>> {
    match request.device_role {
        Some(role) => Json(hub.poll(role)),
        None => Json(Vec::new()),
    }
}

async fn health_handler(State(hub): State<Arc<Hub>>) -> Json<HealthReport> {
    Json(hub.health())
}
