use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use hostctl_remote::HostSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::app::AppState;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event_type", content = "event", rename_all = "snake_case")]
pub enum WsMessage {
    /// Host snapshots: every host on connect (and after the client fell
    /// behind), then one message per batch of reachability changes.
    RemoteState(Vec<HostSnapshot>),
}

/// Gets called for every new web client and spins up an event loop
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // subscribe before taking the snapshot so no change falls in between
    let rx = state.ws_tx.subscribe();
    ws.on_upgrade(move |socket| start_webui_ws_loop(socket, rx, state))
}

async fn send_ws_message(socket: &mut WebSocket, msg: &WsMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("Failed to serialize websocket message: {}", e);
            Err(axum::Error::new(e))
        }
    }
}

fn full_state(state: &AppState) -> WsMessage {
    WsMessage::RemoteState(state.controller.get_state())
}

/// We start one event loop per client
async fn start_webui_ws_loop(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<WsMessage>,
    state: AppState,
) {
    if let Err(e) = send_ws_message(&mut socket, &full_state(&state)).await {
        warn!("Failed to send initial state: {}", e);
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Websocket client lagged, resending full state");
                        full_state(&state)
                    }
                    Err(RecvError::Closed) => {
                        warn!("Broadcast channel closed, stopping WebSocket handler");
                        break;
                    }
                };
                if let Err(e) = send_ws_message(&mut socket, &msg).await {
                    warn!("Failed to send message, closing connection: {}", e);
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Ok(Message::Close(_)) | Err(_)) => {
                        info!("WebSocket connection closed");
                        break;
                    }
                    // clients have nothing to say, pings are answered by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
