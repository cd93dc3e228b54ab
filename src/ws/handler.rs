//! WebSocket upgrade handler

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::session::{ActorInput, SessionHandle, SessionInput};
use crate::game::vehicle::ActorId;
use crate::util::rate_limit::ActorRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session to observe; the default session when omitted
    pub session: Option<Uuid>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let session_id = query.session.unwrap_or(state.default_session);
    match state.sessions.get(&session_id) {
        Some(session) => ws.on_upgrade(move |socket| handle_socket(socket, session)),
        None => {
            warn!(session_id = %session_id, "WebSocket upgrade for unknown session");
            (StatusCode::NOT_FOUND, "Unknown session").into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, session: SessionHandle) {
    let actor_id = ActorId::new();
    info!(actor_id = %actor_id, session_id = %session.id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before asking for the full state so nothing falls in between
    let updates_rx = session.subscribe();

    let welcome = ServerMsg::Welcome {
        actor_id,
        session_id: session.id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(actor_id = %actor_id, error = %e, "Failed to send welcome");
        return;
    }

    if session
        .input_tx
        .send(SessionInput::Resync { actor_id })
        .await
        .is_err()
    {
        debug!(actor_id = %actor_id, "Session already stopped");
        return;
    }

    session.actor_count.fetch_add(1, Ordering::Relaxed);
    run_connection(actor_id, ws_sink, ws_stream, session.input_tx.clone(), updates_rx).await;
    session.actor_count.fetch_sub(1, Ordering::Relaxed);

    info!(actor_id = %actor_id, "WebSocket connection closed");
}

/// Run the connection with read/write split
async fn run_connection(
    actor_id: ActorId,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    input_tx: mpsc::Sender<SessionInput>,
    mut updates_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = ActorRateLimiter::new();

    // Writer task: session broadcast -> WebSocket, filtered to this actor
    let resync_tx = input_tx.clone();
    let writer_handle = tokio::spawn(async move {
        loop {
            match updates_rx.recv().await {
                Ok(msg) => {
                    if !msg.is_for(actor_id) {
                        continue;
                    }
                    let ended = matches!(msg, ServerMsg::SessionEnded { .. });
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(actor_id = %actor_id, error = %e, "WebSocket send failed");
                        break;
                    }
                    if ended {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Field updates are latest-value, a full state catches the observer up
                    warn!(actor_id = %actor_id, lagged_count = n, "Observer lagged, requesting resync");
                    if resync_tx.try_send(SessionInput::Resync { actor_id }).is_err() {
                        debug!(actor_id = %actor_id, "Resync request dropped");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(actor_id = %actor_id, "Session channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> session task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(actor_id = %actor_id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                if !admit(&rate_limiter, actor_id, &client_msg) {
                    continue;
                }

                let input = ActorInput {
                    actor_id,
                    msg: client_msg,
                };
                if input_tx.send(SessionInput::Actor(input)).await.is_err() {
                    debug!(actor_id = %actor_id, "Session input channel closed");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(actor_id = %actor_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(actor_id = %actor_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(actor_id = %actor_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Release any held seat before the actor goes away
    let _ = input_tx
        .send(SessionInput::Actor(ActorInput {
            actor_id,
            msg: ClientMsg::Leave,
        }))
        .await;

    writer_handle.abort();
}

/// Rate limiting and boundary validation for one message
fn admit(rate_limiter: &ActorRateLimiter, actor_id: ActorId, msg: &ClientMsg) -> bool {
    if let Some((vehicle_id, intent)) = msg.intent() {
        if !rate_limiter.check_intent() {
            debug!(actor_id = %actor_id, "Rate limited intent");
            return false;
        }
        if let Err(e) = intent.validate() {
            warn!(actor_id = %actor_id, vehicle_id = %vehicle_id, error = %e, "Malformed intent");
            return false;
        }
        return true;
    }

    if matches!(msg, ClientMsg::Occupy { .. }) && !rate_limiter.check_seat_request() {
        debug!(actor_id = %actor_id, "Rate limited seat request");
        return false;
    }
    true
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
