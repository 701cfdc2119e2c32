//! HTTP JSON-RPC endpoint.
//!
//! Grounded on `src/handlers.rs`'s axum handler shape (`axum::extract::State`,
//! `#[instrument(skip_all)]`, match-on-result-then-log-then-respond), collapsed
//! from a one-route-per-verb layout to a single dispatch point
//! matching on `GuardianMethod` — every Guardian method rides the same
//! `POST /rpc` envelope.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{FromRequest, Request, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use bubble_guardian::guardian::{Guardian, GuardianOutcome};
use bubble_guardian::{BlockchainProvider, DataServer};
use bubble_types::rpc::envelope::{RequestEnvelope, ResponseEnvelope};
use bubble_types::rpc::error::GuardianErrorCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

/// A `Json` extractor whose rejection is a spec-§6-shaped `ResponseEnvelope`
/// (`PARSE_ERROR`, -32700) rather than axum's bare default rejection body, so
/// a malformed `/rpc` request comes back in the same envelope shape as every
/// other Guardian error — matching the WebSocket transport's handling of a
/// bad frame in `ws.rs`.
struct RpcJson<T>(T);

impl<S, T> FromRequest<S> for RpcJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Json<ResponseEnvelope>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(RpcJson(value)),
            // The request never parsed far enough to have an id.
            Err(_rejection) => Err(Json(parse_error_response(Value::Null))),
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}

/// The default per-request send/receive timeout applied to `/rpc`, carried
/// as an `Extension` rather than a `tower_http::timeout::TimeoutLayer` so a
/// lapsed request still gets a proper JSON-RPC error body instead of a bare
/// 408.
#[derive(Clone, Copy)]
struct RequestTimeout(Duration);

/// Builds the axum router for the reference Guardian server: `POST /rpc` for
/// the JSON-RPC envelope, `GET /ws` for the WebSocket subscription
/// transport, and a bare `GET /health` liveness probe.
pub fn routes<B, D>(ws_heartbeat: Duration, request_timeout: Duration) -> Router<Arc<Guardian<B, D>>>
where
    B: BlockchainProvider + 'static,
    D: DataServer + 'static,
{
    Router::new()
        .route("/health", get(get_health))
        .route("/rpc", post(post_rpc::<B, D>))
        .route("/ws", get(crate::ws::upgrade::<B, D>))
        .layer(Extension(Arc::new(crate::ws::WsConfig { heartbeat: ws_heartbeat })))
        .layer(Extension(RequestTimeout(request_timeout)))
}

#[instrument(skip_all)]
async fn get_health() -> &'static str {
    "ok"
}

/// `POST /rpc`: dispatches one JSON-RPC 2.0 request through the Guardian.
///
/// A request whose method resolves to [`GuardianOutcome::Subscribed`] still
/// gets a normal success response carrying the initial snapshot — the
/// long-lived notification stream itself is only deliverable over the
/// WebSocket upgrade in `ws.rs`, so an HTTP-only `subscribe` registers a
/// subscription nothing will ever drain.
///
/// The Guardian call is raced against the configured request timeout; a
/// lapsed request comes back as `INTERNAL_ERROR` rather than hanging the
/// connection open.
#[instrument(skip_all, fields(method = %envelope.method))]
async fn post_rpc<B, D>(
    State(guardian): State<Arc<Guardian<B, D>>>,
    Extension(RequestTimeout(timeout)): Extension<RequestTimeout>,
    RpcJson(envelope): RpcJson<RequestEnvelope>,
) -> Json<ResponseEnvelope>
where
    B: BlockchainProvider + 'static,
    D: DataServer + 'static,
{
    let id = envelope.id.clone();
    let connection_id = Uuid::new_v4();
    let outcome = tokio::time::timeout(timeout, guardian.handle(envelope.method, &envelope.params, now_ms(), connection_id)).await;
    match outcome {
        Ok(Ok(GuardianOutcome::Result(value))) => Json(ResponseEnvelope::success(id, value)),
        Ok(Ok(GuardianOutcome::Subscribed { snapshot, receiver, .. })) => {
            drop(receiver);
            Json(ResponseEnvelope::success(id, snapshot))
        }
        Ok(Err(error)) => {
            tracing::warn!(code = ?error.code, message = %error.message, "guardian rejected request");
            Json(ResponseEnvelope::error(id, error.code, Some(Value::String(error.message))))
        }
        Err(_elapsed) => {
            tracing::warn!(?timeout, "request timed out");
            Json(ResponseEnvelope::error(id, GuardianErrorCode::InternalError, Some(Value::String("request timed out".to_string()))))
        }
    }
}

/// Maps a request-level parse failure (the body wasn't valid JSON, or didn't
/// match [`RequestEnvelope`]'s shape) to the standard JSON-RPC `PARSE_ERROR`
/// code — used by [`RpcJson`]'s rejection so a malformed `/rpc` body still
/// comes back as a proper envelope instead of axum's bare default rejection.
pub fn parse_error_response(id: Value) -> ResponseEnvelope {
    ResponseEnvelope::error(id, GuardianErrorCode::ParseError, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_response_carries_the_standard_code() {
        let response = parse_error_response(Value::Null);
        assert_eq!(response.error.unwrap().code, -32700);
    }

    #[tokio::test]
    async fn malformed_body_rejects_with_a_parse_error_envelope() {
        let request = Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("not json"))
            .unwrap();
        let rejection = RpcJson::<RequestEnvelope>::from_request(request, &()).await.unwrap_err();
        assert_eq!(rejection.0.error.unwrap().code, -32700);
    }
}
