use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::info;

use typerace_core::protocol::{ClientEvent, ServerEvent};

use crate::matches;
use crate::queue::JoinOutcome;
use crate::registry::ConnId;
use crate::state::AppState;

/// Max inbound messages per second per connection.
const RATE_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsAuth {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

/// WebSocket upgrade. The handshake must carry the identity attached by the
/// fronting auth layer; without it the connection is refused.
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(auth): Query<WsAuth>,
    ws: WebSocketUpgrade,
) -> Response {
    let (user_id, username) = match (auth.user_id, auth.username) {
        (Some(id), Some(name)) if !id.is_empty() && !name.is_empty() => (id, name),
        _ => return (StatusCode::UNAUTHORIZED, "Authentication failed").into_response(),
    };
    ws.on_upgrade(move |socket| handle_socket(state, socket, user_id, username))
        .into_response()
}

/// Per-connection loop -- spawned on upgrade. Forwards queued server events
/// out, parses and dispatches inbound events, cleans up on close.
pub async fn handle_socket(
    state: Arc<AppState>,
    mut socket: WebSocket,
    user_id: String,
    username: String,
) {
    let conn_id = state.registry.next_conn_id();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.registry.bind(conn_id, &user_id, &username, tx.clone());
    info!("{} connected (conn {})", username, conn_id);

    let mut window_start = Instant::now();
    let mut window_count = 0u32;

    loop {
        tokio::select! {
            // Outbound: forward queued events to the WebSocket.
            Some(event) = rx.recv() => {
                if let Ok(json) = serde_json::to_string(&event) {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
            // Inbound: read from the WebSocket.
            maybe_msg = socket.recv() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        let now = Instant::now();
                        if now.duration_since(window_start) > Duration::from_secs(1) {
                            window_start = now;
                            window_count = 0;
                        }
                        window_count += 1;
                        if window_count > RATE_LIMIT {
                            let _ = tx.send(ServerEvent::Error {
                                message: "Rate limited".into(),
                            });
                            continue;
                        }

                        let event: ClientEvent = match serde_json::from_str(&text) {
                            Ok(event) => event,
                            Err(err) => {
                                let _ = tx.send(ServerEvent::Error {
                                    message: format!("Invalid message: {}", err),
                                });
                                continue;
                            }
                        };
                        handle_event(&state, conn_id, &user_id, &username, &tx, event).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => continue,
                }
            }
        }
    }

    // Transport closed: unbind, drop any queue slot, and let the coordinator
    // decide whether an abandoned match must be cancelled.
    state.registry.unbind(conn_id);
    if !state.registry.is_online(&user_id) && state.queue.leave(&user_id) {
        state.broadcast_queue_status();
    }
    matches::handle_disconnect(&state, &user_id).await;
    info!("{} disconnected (conn {})", username, conn_id);
}

/// Route one inbound event to the queue or the match coordinator.
async fn handle_event(
    state: &Arc<AppState>,
    conn_id: ConnId,
    user_id: &str,
    username: &str,
    tx: &mpsc::UnboundedSender<ServerEvent>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinQueue => {
            if matches::user_in_live_match(state, user_id) {
                let _ = tx.send(ServerEvent::Error {
                    message: "Already in an active match".into(),
                });
                return;
            }
            match state.queue.join(user_id, username) {
                JoinOutcome::Joined(queue_size) => {
                    let _ = tx.send(ServerEvent::QueueJoined {
                        queue_size,
                        message: "Joined matchmaking queue".into(),
                    });
                    state.broadcast_queue_status();
                    matches::pair_off(state).await;
                }
                JoinOutcome::AlreadyQueued(_) => {
                    let _ = tx.send(ServerEvent::Error {
                        message: "Already in queue".into(),
                    });
                }
            }
        }

        ClientEvent::LeaveQueue => {
            if state.queue.leave(user_id) {
                let _ = tx.send(ServerEvent::QueueLeft {
                    message: "Left matchmaking queue".into(),
                });
                state.broadcast_queue_status();
            } else {
                let _ = tx.send(ServerEvent::Error {
                    message: "Not in queue".into(),
                });
            }
        }

        ClientEvent::AcceptMatch { match_id } => {
            matches::handle_accept(state, conn_id, user_id, &match_id).await;
        }

        ClientEvent::Progress { match_id, wpm, acc } => {
            matches::handle_progress(state, user_id, &match_id, wpm, acc).await;
        }

        ClientEvent::Complete { match_id, wpm, acc } => {
            matches::handle_complete(state, user_id, &match_id, wpm, acc).await;
        }

        ClientEvent::Forfeit { match_id } => {
            matches::handle_forfeit(state, user_id, &match_id).await;
        }

        ClientEvent::Reconnect { match_id } => {
            matches::handle_reconnect(state, conn_id, user_id, &match_id).await;
        }
    }
}
