//! WebSocket channel transport and read-only REST API.
//!
//! `GET /ws?channel=<id>&token=<jwt>` upgrades, runs the gateway checks and
//! either joins the channel or sends one `connect-error` frame and closes.
//! The token may instead be passed as `Authorization: Bearer <jwt>`.
//!
//! The REST API only reports live state. Messages are sent over the socket.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, Method, header};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::message::{InboundFrame, OutboundFrame};
use crate::server::SharedState;
use crate::session::Session;

const WS_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Server start time.
static START_TIME: std::sync::OnceLock<SystemTime> = std::sync::OnceLock::new();

pub fn router(state: Arc<SharedState>) -> Router {
    START_TIME.get_or_init(SystemTime::now);
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            state
                .config
                .allowed_origins
                .iter()
                .filter_map(|o| o.trim().parse().ok()),
        ))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/v1/health", get(api_health))
        .route("/api/v1/channels", get(api_channels))
        .layer(cors)
        .with_state(state)
}

// ── WebSocket handler ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    channel: Option<String>,
    token: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// A blank `?token=` falls through to the `Authorization` header.
fn connect_credential(query_token: Option<String>, headers: &HeaderMap) -> Option<String> {
    query_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| bearer_token(headers))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    State(state): State<Arc<SharedState>>,
) -> impl IntoResponse {
    let credential = connect_credential(query.token, &headers);
    ws.on_upgrade(move |socket| handle_ws(socket, state, credential, query.channel))
}

async fn handle_ws(
    mut socket: WebSocket,
    state: Arc<SharedState>,
    credential: Option<String>,
    channel: Option<String>,
) {
    let session = match state
        .gateway
        .admit(credential.as_deref(), channel.as_deref())
        .await
    {
        Ok(session) => session,
        Err(e) => {
            let frame = OutboundFrame::ConnectError((&e).into()).to_json();
            let _ = socket.send(WsMessage::Text(frame.into())).await;
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
    };

    let mut outbox = state.router.join(&session);
    loop {
        tokio::select! {
            frame = socket.recv() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => handle_inbound(&state, &session, text.as_str()),
                    Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => handle_inbound(&state, &session, text),
                        Err(_) => state.events.warn(
                            "Dropped non-UTF-8 frame",
                            json!({ "sessionId": session.id, "bytes": data.len() }),
                        ),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ping/Pong handled by axum
                    Some(Err(e)) => {
                        tracing::debug!(session = %session.id, "WebSocket read failed: {e}");
                        break;
                    }
                }
            }
            line = outbox.recv() => {
                let Some(line) = line else { break };
                match tokio::time::timeout(WS_SEND_TIMEOUT, socket.send(WsMessage::Text(line.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) | Err(_) => {
                        tracing::debug!(session = %session.id, "WebSocket send failed or timed out, closing");
                        break;
                    }
                }
            }
            _ = session.closed() => break,
        }
    }

    state.router.leave(&session);
    let _ = socket.send(WsMessage::Close(None)).await;
}

fn handle_inbound(state: &SharedState, session: &Session, text: &str) {
    if text.len() > state.config.max_frame_bytes {
        state.events.warn(
            "Dropped oversized frame",
            json!({
                "sessionId": session.id,
                "bytes": text.len(),
                "limit": state.config.max_frame_bytes,
            }),
        );
        return;
    }
    match serde_json::from_str::<InboundFrame>(text) {
        Ok(InboundFrame::ChannelMessage(message)) => {
            state.router.relay(session, message);
        }
        Err(e) => state.events.warn(
            "Dropped invalid frame",
            json!({ "sessionId": session.id, "error": e.to_string() }),
        ),
    }
}

// ── REST handlers ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    connections: usize,
    channels: usize,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct ChannelInfo {
    id: String,
    members: usize,
}

async fn api_health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    let start = START_TIME.get_or_init(SystemTime::now);
    let uptime = start.elapsed().unwrap_or_default().as_secs();
    let stats = state.router.channel_stats();
    Json(HealthResponse {
        connections: stats.iter().map(|(_, members)| members).sum(),
        channels: stats.len(),
        uptime_secs: uptime,
    })
}

async fn api_channels(State(state): State<Arc<SharedState>>) -> Json<Vec<ChannelInfo>> {
    let list = state
        .router
        .channel_stats()
        .into_iter()
        .map(|(id, members)| ChannelInfo {
            id: id.to_string(),
            members,
        })
        .collect();
    Json(list)
}
