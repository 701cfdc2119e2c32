//! WebSocket subscription transport.
//!
//! One task per connection reading JSON-RPC text frames off the socket and
//! writing JSON-RPC responses back, with a dedicated per-connection id used
//! to clean up state when the transport closes. Every JSON-RPC method (not
//! just `subscribe`/`unsubscribe`) rides this same socket, since a WebSocket
//! client has no reason to also hold an HTTP connection open. A `subscribe`
//! call leaves a live `broadcast::Receiver` running on a spawned fan-out
//! task that forwards `Notification`s onto the socket until `unsubscribe`
//! or disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::Extension;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bubble_guardian::guardian::{Guardian, GuardianOutcome};
use bubble_guardian::{BlockchainProvider, DataServer};
use bubble_types::rpc::envelope::{RequestEnvelope, ResponseEnvelope};
use bubble_types::rpc::error::GuardianErrorCode;
use futures::stream::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-connection state shared between the socket-reader loop and every
/// subscription fan-out task it spawns.
pub struct WsConfig {
    pub heartbeat: Duration,
}

pub async fn upgrade<B, D>(
    State(guardian): State<Arc<Guardian<B, D>>>,
    Extension(config): Extension<Arc<WsConfig>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse
where
    B: BlockchainProvider + 'static,
    D: DataServer + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, guardian, config))
}

async fn handle_socket<B, D>(mut socket: WebSocket, guardian: Arc<Guardian<B, D>>, config: Arc<WsConfig>)
where
    B: BlockchainProvider + 'static,
    D: DataServer + 'static,
{
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "websocket connection opened");

    // Outgoing notifications from every subscription this connection holds
    // funnel through one channel, so the socket only ever has one writer.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(256);
    let mut heartbeat = interval(config.heartbeat);

    loop {
        tokio::select! {
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_message(&guardian, connection_id, text.as_ref(), outbound_tx.clone()).await;
                        if socket.send(Message::Text(response.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%connection_id, "websocket closed by peer");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%connection_id, error = %err, "websocket transport error");
                        break;
                    }
                }
            }
            Some(message) = outbound_rx.recv() => {
                if socket.send(message).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    guardian.subscriptions().drop_connection(connection_id);
    info!(%connection_id, "websocket connection closed");
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}

/// Handles one JSON-RPC request read off the socket. `subscribe` spawns a
/// forwarding task onto `outbound` and returns the initial snapshot as the
/// immediate reply, matching the HTTP endpoint's response shape so a client
/// can use either transport interchangeably for every method but `subscribe`.
async fn handle_message<B, D>(guardian: &Arc<Guardian<B, D>>, connection_id: Uuid, text: &str, outbound: mpsc::Sender<Message>) -> String
where
    B: BlockchainProvider + 'static,
    D: DataServer + 'static,
{
    let envelope: RequestEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            let response = ResponseEnvelope::error(Value::Null, GuardianErrorCode::ParseError, Some(Value::String(err.to_string())));
            return serde_json::to_string(&response).expect("ResponseEnvelope always serializes");
        }
    };
    let id = envelope.id.clone();

    match guardian.handle(envelope.method, &envelope.params, now_ms(), connection_id).await {
        Ok(GuardianOutcome::Result(value)) => serde_json::to_string(&ResponseEnvelope::success(id, value)).expect("ResponseEnvelope always serializes"),
        Ok(GuardianOutcome::Subscribed { subscription_id, snapshot, mut receiver }) => {
            tokio::spawn(async move {
                while let Ok(notification) = receiver.recv().await {
                    let frame = serde_json::json!({
                        "jsonrpc": "2.0",
                        "method": "notification",
                        "params": notification,
                    });
                    let text = serde_json::to_string(&frame).expect("notification frame always serializes");
                    if outbound.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            });
            debug!(%subscription_id, "subscription registered");
            serde_json::to_string(&ResponseEnvelope::success(id, snapshot)).expect("ResponseEnvelope always serializes")
        }
        Err(error) => {
            warn!(code = ?error.code, message = %error.message, "guardian rejected request");
            serde_json::to_string(&ResponseEnvelope::error(id, error.code, Some(Value::String(error.message)))).expect("ResponseEnvelope always serializes")
        }
    }
}
